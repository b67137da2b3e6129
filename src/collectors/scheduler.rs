use super::{now_ms, Cycle, Origin, Payload, Snapshot, Source};
use crate::bus::{DeliveryContext, Publisher, SnapshotBus};
use crate::error::CollectError;
use crate::exec::{cancelled, CommandExecutor};
use crate::metrics::Metrics;
use crate::provider::TelemetryProvider;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Start/stop surface shared by every collector, for heterogeneous lists.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &'static str;
    /// Starts polling. Calling it while running does nothing.
    fn start(&self);
    /// Stops polling and returns once nothing more will be delivered.
    async fn stop(&self);
    fn is_running(&self) -> bool;
}

#[derive(Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    pub command_timeout: Duration,
    pub provider: Arc<dyn TelemetryProvider>,
    pub delivery: DeliveryContext,
    pub metrics: Option<Arc<Metrics>>,
}

struct Running {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polls one [`Source`] on a fixed interval and hands each snapshot to a
/// callback through a [`SnapshotBus`].
pub struct Collector<S: Source> {
    name: &'static str,
    source: Arc<tokio::sync::Mutex<S>>,
    settings: CollectorSettings,
    bus: SnapshotBus<Snapshot<S::Output>>,
    running: Mutex<Option<Running>>,
}

impl<S: Source> Collector<S> {
    pub fn new<F>(source: S, settings: CollectorSettings, callback: F) -> Self
    where
        F: Fn(Arc<Snapshot<S::Output>>) + Send + Sync + 'static,
    {
        Self {
            name: source.name(),
            source: Arc::new(tokio::sync::Mutex::new(source)),
            settings,
            bus: SnapshotBus::new(callback),
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawns the polling task on the current tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!(source = self.name, "collector already running");
            return;
        }

        self.bus.open(&self.settings.delivery);
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(poll(
            Arc::clone(&self.source),
            self.settings.clone(),
            self.bus.publisher(),
            cancel_rx,
        ));
        *running = Some(Running { cancel, task });
        info!(
            source = self.name,
            interval_ms = self.settings.interval.as_millis() as u64,
            "collector started"
        );
    }

    /// Cancels the loop, kills the command in flight and waits for the task
    /// to exit. The source's carried state is cleared.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Running { cancel, task }) = running else {
            return;
        };
        let _ = cancel.send(true);
        if let Err(err) = task.await {
            if err.is_panic() {
                warn!(source = self.name, error = %err, "collector task panicked");
            }
        }
        self.bus.close().await;
        self.source.lock().await.reset();
        info!(source = self.name, "collector stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// The most recent snapshot, whether or not it reached the callback.
    pub fn latest(&self) -> Option<Arc<Snapshot<S::Output>>> {
        self.bus.latest()
    }
}

#[async_trait]
impl<S: Source> Lifecycle for Collector<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&self) {
        Collector::start(self);
    }

    async fn stop(&self) {
        Collector::stop(self).await;
    }

    fn is_running(&self) -> bool {
        Collector::is_running(self)
    }
}

async fn poll<S: Source>(
    source: Arc<tokio::sync::Mutex<S>>,
    settings: CollectorSettings,
    publisher: Publisher<Snapshot<S::Output>>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq = 0_u64;

    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = ticker.tick() => {}
        }

        let mut source = source.lock().await;
        let name = source.name();
        let mut executor = CommandExecutor::new(Some(settings.command_timeout), cancel.clone());
        if let Some(metrics) = &settings.metrics {
            executor = executor.with_metrics(Arc::clone(metrics));
            metrics.inc_cycle(name);
        }
        let collected_at_ms = now_ms();
        let mut cycle = Cycle::new(
            name,
            executor,
            Arc::clone(&settings.provider),
            collected_at_ms,
        )
        .with_metrics(settings.metrics.clone());

        // Commands observe `cancel` themselves, so a stop lands here as
        // `Cancelled` once the child has been reaped.
        let outcome = match AssertUnwindSafe(source.collect(&mut cycle))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                source.reset();
                Err(CollectError::Panicked { name })
            }
        };

        let (data, origin) = match outcome {
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                warn!(source = name, error = %err, "collection cycle failed");
                if let Some(metrics) = &settings.metrics {
                    metrics.inc_collect_error(name, err.kind());
                }
                (source.placeholder(collected_at_ms), Origin::Synthetic)
            }
            Ok(data) if data.is_empty() => {
                debug!(source = name, "cycle produced no records, using placeholder");
                if let Some(metrics) = &settings.metrics {
                    metrics.inc_fallback(name, "all");
                }
                (source.placeholder(collected_at_ms), Origin::Synthetic)
            }
            Ok(data) => {
                let origin = cycle.origin(source.parts());
                (data, origin)
            }
        };
        drop(source);

        if *cancel.borrow() {
            break;
        }
        seq += 1;
        publisher.publish(Snapshot {
            source: name,
            seq,
            collected_at_ms,
            origin,
            data,
        });
        if let Some(metrics) = &settings.metrics {
            metrics.inc_delivery(name);
        }
    }
    debug!("collector loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProcfsProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Emits one record per cycle, or nothing when `empty` is set.
    struct Counting {
        cycles: Arc<AtomicUsize>,
        empty: bool,
        fail: bool,
        panic_on: Option<u64>,
        resets: Arc<AtomicUsize>,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                cycles: Arc::new(AtomicUsize::new(0)),
                empty: false,
                fail: false,
                panic_on: None,
                resets: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Source for Counting {
        type Output = Vec<u64>;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn collect(&mut self, _cycle: &mut Cycle) -> Result<Vec<u64>, CollectError> {
            let n = self.cycles.fetch_add(1, Ordering::SeqCst) as u64;
            if self.panic_on == Some(n) {
                panic!("counter overflow in cycle {n}");
            }
            if self.fail {
                return Err(CollectError::Unavailable {
                    program: "dumpsys".to_string(),
                    reason: "not installed".to_string(),
                });
            }
            Ok(if self.empty { Vec::new() } else { vec![n] })
        }

        fn placeholder(&self, now_ms: i64) -> Vec<u64> {
            vec![now_ms as u64, 0]
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Runs a command that never finishes on its own.
    struct Sleeper {
        pid_file: std::path::PathBuf,
    }

    #[async_trait]
    impl Source for Sleeper {
        type Output = Vec<String>;

        fn name(&self) -> &'static str {
            "sleeper"
        }

        async fn collect(&mut self, cycle: &mut Cycle) -> Result<Vec<String>, CollectError> {
            let script = format!("echo $$ > {}; sleep 30", self.pid_file.display());
            cycle.executor().lines("sh", &["-c", &script]).await
        }

        fn placeholder(&self, _now_ms: i64) -> Vec<String> {
            vec!["placeholder".to_string()]
        }
    }

    fn settings(interval_ms: u64) -> CollectorSettings {
        CollectorSettings {
            interval: Duration::from_millis(interval_ms),
            command_timeout: Duration::from_secs(60),
            provider: Arc::new(ProcfsProvider::new("/nonexistent-procfs")),
            delivery: DeliveryContext::spawn().expect("delivery thread"),
            metrics: None,
        }
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivery in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn delivers_sequenced_snapshots() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new(Counting::new(), settings(20), move |s| {
            let _ = tx.send(s);
        });
        collector.start();
        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        assert_eq!(first.source, "counting");
        assert_eq!(first.origin, Origin::Collected);
        assert!(second.seq > first.seq);
        collector.stop().await;
    }

    #[tokio::test]
    async fn start_twice_runs_one_task() {
        let source = Counting::new();
        let cycles = Arc::clone(&source.cycles);
        let collector = Collector::new(source, settings(100), |_| {});
        collector.start();
        collector.start();
        assert!(collector.is_running());
        tokio::time::sleep(Duration::from_millis(250)).await;
        collector.stop().await;
        // One task ticking every 100 ms: 0, 100 and 200 ms.
        let n = cycles.load(Ordering::SeqCst);
        assert!((2..=4).contains(&n), "unexpected cycle count {n}");
        assert!(!collector.is_running());
    }

    #[tokio::test]
    async fn nothing_delivered_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let collector = Collector::new(Counting::new(), settings(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        collector.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        collector.stop().await;
        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn empty_cycle_delivers_placeholder_exactly() {
        let mut source = Counting::new();
        source.empty = true;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new(source, settings(50), move |s| {
            let _ = tx.send(s);
        });
        collector.start();
        let snapshot = next(&mut rx).await;
        collector.stop().await;
        assert_eq!(snapshot.origin, Origin::Synthetic);
        assert_eq!(snapshot.data, vec![snapshot.collected_at_ms as u64, 0]);
    }

    #[tokio::test]
    async fn failing_cycle_keeps_polling() {
        let mut source = Counting::new();
        source.fail = true;
        let cycles = Arc::clone(&source.cycles);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut settings = settings(20);
        settings.metrics = Some(Metrics::new().expect("metrics"));
        let metrics = settings.metrics.clone().expect("metrics");
        let collector = Collector::new(source, settings, move |s| {
            let _ = tx.send(s);
        });
        collector.start();
        let first = next(&mut rx).await;
        let _second = next(&mut rx).await;
        collector.stop().await;
        assert_eq!(first.origin, Origin::Synthetic);
        assert!(cycles.load(Ordering::SeqCst) >= 2);
        let text = metrics.render().expect("render");
        assert!(text.contains("aosprobe_collect_errors_total{kind=\"unavailable\",source=\"counting\"}"));
    }

    #[tokio::test]
    async fn panicking_cycle_is_isolated() {
        let mut source = Counting::new();
        source.panic_on = Some(0);
        let resets = Arc::clone(&source.resets);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut settings = settings(20);
        settings.metrics = Some(Metrics::new().expect("metrics"));
        let metrics = settings.metrics.clone().expect("metrics");
        let collector = Collector::new(source, settings, move |s| {
            let _ = tx.send(s);
        });
        collector.start();
        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        assert!(collector.is_running());
        collector.stop().await;

        assert_eq!(first.origin, Origin::Synthetic);
        assert_eq!(second.origin, Origin::Collected);
        assert_eq!(second.data, vec![1]);
        assert_eq!(resets.load(Ordering::SeqCst), 2);
        let text = metrics.render().expect("render");
        assert!(text.contains("aosprobe_collect_errors_total{kind=\"panic\",source=\"counting\"} 1"));
    }

    #[tokio::test]
    async fn stop_resets_source_and_restart_works() {
        let source = Counting::new();
        let resets = Arc::clone(&source.resets);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collector = Collector::new(source, settings(20), move |s| {
            let _ = tx.send(s);
        });
        collector.start();
        next(&mut rx).await;
        collector.stop().await;
        collector.stop().await;
        assert_eq!(resets.load(Ordering::SeqCst), 1);

        while rx.try_recv().is_ok() {}
        collector.start();
        let again = next(&mut rx).await;
        assert_eq!(again.seq, 1);
        collector.stop().await;
    }

    #[tokio::test]
    async fn stop_kills_in_flight_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("pid");
        let collector = Collector::new(
            Sleeper {
                pid_file: pid_file.clone(),
            },
            settings(1_000),
            |_| {},
        );
        collector.start();
        let mut pid = String::new();
        for _ in 0..250 {
            pid = std::fs::read_to_string(&pid_file).unwrap_or_default();
            if pid.ends_with('\n') {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!pid.trim().is_empty(), "command never started");

        let started = std::time::Instant::now();
        collector.stop().await;
        assert!(started.elapsed() < Duration::from_secs(10));

        let proc_dir = format!("/proc/{}", pid.trim());
        for _ in 0..100 {
            if !std::path::Path::new(&proc_dir).exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!std::path::Path::new(&proc_dir).exists());
        assert!(collector.latest().is_none());
    }
}
