use aosprobe::bus::DeliveryContext;
use aosprobe::collectors::diagnostics::DiagnosticsSource;
use aosprobe::collectors::framework::FrameworkSource;
use aosprobe::collectors::hal::HalSource;
use aosprobe::collectors::logcat::{LogTail, LogTailSettings};
use aosprobe::collectors::native::NativeSource;
use aosprobe::collectors::network::NetworkStatsSource;
use aosprobe::collectors::security::SecuritySource;
use aosprobe::collectors::system::SystemInfoSource;
use aosprobe::collectors::tcp::TcpSource;
use aosprobe::collectors::{Collector, CollectorSettings, Lifecycle, Snapshot, Source};
use aosprobe::config::{Config, SourceKind};
use aosprobe::metrics::Metrics;
use aosprobe::provider::{ProcfsProvider, TelemetryProvider};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aosprobe")]
#[command(version)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Run only the named sources. Repeatable.
    #[arg(long = "only", value_name = "SOURCE")]
    only: Vec<SourceKind>,
    /// Print every snapshot as one JSON line on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };
    let delivery = match DeliveryContext::spawn() {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, "failed to start delivery thread");
            std::process::exit(1);
        }
    };
    let provider: Arc<dyn TelemetryProvider> = Arc::new(ProcfsProvider::new(&cfg.procfs_root));

    let selected = |kind: SourceKind| {
        if cli.only.is_empty() {
            cfg.is_enabled(kind)
        } else {
            cli.only.contains(&kind)
        }
    };

    let mut components: Vec<Box<dyn Lifecycle>> = Vec::new();
    for kind in SourceKind::ALL.into_iter().filter(|k| selected(*k)) {
        let settings = CollectorSettings {
            interval: cfg.interval(kind),
            command_timeout: cfg.command_timeout(kind),
            provider: Arc::clone(&provider),
            delivery: delivery.clone(),
            metrics: Some(Arc::clone(&metrics)),
        };
        let json = cli.json;
        let component = match kind {
            SourceKind::System => collector(SystemInfoSource::new(&cfg.sysfs_root), settings, json),
            SourceKind::Diagnostics => collector(DiagnosticsSource::new(), settings, json),
            SourceKind::Security => collector(SecuritySource::new(), settings, json),
            SourceKind::Framework => collector(FrameworkSource::new(), settings, json),
            SourceKind::Hal => collector(HalSource::new(), settings, json),
            SourceKind::Native => collector(NativeSource::new(cfg.native_pid()), settings, json),
            SourceKind::NetworkStats => collector(NetworkStatsSource::new(), settings, json),
            SourceKind::Tcp => collector(TcpSource::new(), settings, json),
        };
        components.push(component);
    }

    if cfg.logcat.enabled && cli.only.is_empty() {
        let settings = LogTailSettings {
            buffer_lines: cfg.logcat.buffer_lines,
            restart_delay: Duration::from_millis(cfg.logcat.restart_delay_ms),
            delivery: delivery.clone(),
            metrics: Some(Arc::clone(&metrics)),
        };
        let json = cli.json;
        components.push(Box::new(LogTail::new(settings, move |line| {
            if json {
                match serde_json::to_string(&serde_json::json!({ "source": "logcat", "line": line })) {
                    Ok(text) => println!("{text}"),
                    Err(err) => warn!(error = %err, "failed to encode log line"),
                }
            } else {
                info!(source = "logcat", "{line}");
            }
        })));
    }

    if components.is_empty() {
        warn!("no sources enabled, nothing to do");
        return;
    }

    info!(
        procfs_root = %cfg.procfs_root,
        sources = components.len(),
        "starting aosprobe"
    );
    for component in &components {
        component.start();
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down");

    for component in &components {
        component.stop().await;
    }

    match metrics.render() {
        Ok(text) => debug!(metrics = %text, "final metrics"),
        Err(err) => warn!(error = %err, "failed to render metrics"),
    }
}

fn collector<S>(source: S, settings: CollectorSettings, json: bool) -> Box<dyn Lifecycle>
where
    S: Source,
    S::Output: Serialize,
{
    Box::new(Collector::new(source, settings, move |snap| report(&*snap, json)))
}

fn report<T: Serialize>(snap: &Snapshot<T>, json: bool) {
    if json {
        match serde_json::to_string(snap) {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(source = snap.source, error = %err, "failed to encode snapshot"),
        }
        return;
    }

    let at = UNIX_EPOCH + Duration::from_millis(u64::try_from(snap.collected_at_ms).unwrap_or(0));
    info!(
        source = snap.source,
        seq = snap.seq,
        origin = ?snap.origin,
        at = %humantime::format_rfc3339_millis(at),
        "snapshot"
    );
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
