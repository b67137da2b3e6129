use super::scheduler::Lifecycle;
use crate::bus::DeliveryContext;
use crate::exec::{cancelled, CommandExecutor};
use crate::metrics::Metrics;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NAME: &str = "logcat";

#[derive(Clone)]
pub struct LogTailSettings {
    pub buffer_lines: usize,
    pub restart_delay: Duration,
    pub delivery: DeliveryContext,
    pub metrics: Option<Arc<Metrics>>,
}

struct Running {
    cancel: watch::Sender<bool>,
    reader: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

/// Follows the system log and hands every line to a callback on the
/// delivery context. Lines arriving while the queue is full are dropped.
pub struct LogTail {
    program: String,
    args: Vec<String>,
    settings: LogTailSettings,
    callback: Arc<dyn Fn(String) + Send + Sync>,
    running: Mutex<Option<Running>>,
}

impl LogTail {
    pub fn new<F>(settings: LogTailSettings, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            program: "logcat".to_string(),
            args: Vec::new(),
            settings,
            callback: Arc::new(callback),
            running: Mutex::new(None),
        }
    }

    /// Replaces the followed command.
    pub fn with_command(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.reader.is_finished()) {
            return;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(self.settings.buffer_lines.max(1));
        let reader = tokio::spawn(follow(
            self.program.clone(),
            self.args.clone(),
            self.settings.clone(),
            tx,
            cancel_rx.clone(),
        ));
        let delivery = self.settings.delivery.handle().spawn(deliver(
            rx,
            Arc::clone(&self.callback),
            cancel_rx,
        ));
        *running = Some(Running {
            cancel,
            reader,
            delivery,
        });
        info!(program = %self.program, "log tail started");
    }

    /// Kills the followed command and waits until no callback is running.
    /// Queued lines are discarded.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Running {
            cancel,
            reader,
            delivery,
        }) = running
        else {
            return;
        };
        let _ = cancel.send(true);
        for task in [reader, delivery] {
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!(error = %err, "log tail task panicked");
                }
            }
        }
        info!(program = %self.program, "log tail stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.reader.is_finished())
    }
}

#[async_trait]
impl Lifecycle for LogTail {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start(&self) {
        LogTail::start(self);
    }

    async fn stop(&self) {
        LogTail::stop(self).await;
    }

    fn is_running(&self) -> bool {
        LogTail::is_running(self)
    }
}

async fn follow(
    program: String,
    args: Vec<String>,
    settings: LogTailSettings,
    tx: mpsc::Sender<String>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut exec = CommandExecutor::new(None, cancel.clone());
    if let Some(metrics) = &settings.metrics {
        exec = exec.with_metrics(Arc::clone(metrics));
    }
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    loop {
        let mut dropped = 0_u64;
        let result = exec
            .stream(&program, &args, |line| {
                if tx.try_send(line).is_err() {
                    dropped += 1;
                }
            })
            .await;
        if dropped > 0 {
            debug!(program = %program, dropped, "log lines dropped, queue full");
        }
        match result {
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                warn!(program = %program, error = %err, "log tail failed");
                if let Some(metrics) = &settings.metrics {
                    metrics.inc_collect_error(NAME, err.kind());
                }
            }
            Ok(()) => debug!(program = %program, "log command exited, restarting"),
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = tokio::time::sleep(settings.restart_delay) => {}
        }
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<String>,
    callback: Arc<dyn Fn(String) + Send + Sync>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            line = rx.recv() => match line {
                Some(line) => callback(line),
                None => break,
            },
        }
    }
}
