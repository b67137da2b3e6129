use prometheus::core::Collector;
use prometheus::{opts, CounterVec, Encoder, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub collect_cycles_total: CounterVec,
    pub collect_errors_total: CounterVec,
    pub fallback_total: CounterVec,
    pub deliveries_total: CounterVec,
    pub last_collect_timestamp_seconds: GaugeVec,
    pub command_runs_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let collect_cycles_total = CounterVec::new(
            opts!(
                "aosprobe_collect_cycles_total",
                "Collection cycles started per source"
            ),
            &["source"],
        )?;
        let collect_errors_total = CounterVec::new(
            opts!(
                "aosprobe_collect_errors_total",
                "Failed collection cycles per source and error kind"
            ),
            &["source", "kind"],
        )?;
        let fallback_total = CounterVec::new(
            opts!(
                "aosprobe_fallback_total",
                "Placeholder substitutions per source and part"
            ),
            &["source", "part"],
        )?;
        let deliveries_total = CounterVec::new(
            opts!(
                "aosprobe_deliveries_total",
                "Snapshots handed to the bus per source"
            ),
            &["source"],
        )?;
        let last_collect_timestamp_seconds = GaugeVec::new(
            opts!(
                "aosprobe_last_collect_timestamp_seconds",
                "Unix time of the last finished cycle per source"
            ),
            &["source"],
        )?;
        let command_runs_total = CounterVec::new(
            opts!(
                "aosprobe_command_runs_total",
                "External command invocations per program and outcome"
            ),
            &["program", "outcome"],
        )?;

        register(&registry, &collect_cycles_total)?;
        register(&registry, &collect_errors_total)?;
        register(&registry, &fallback_total)?;
        register(&registry, &deliveries_total)?;
        register(&registry, &last_collect_timestamp_seconds)?;
        register(&registry, &command_runs_total)?;

        Ok(Arc::new(Self {
            registry,
            collect_cycles_total,
            collect_errors_total,
            fallback_total,
            deliveries_total,
            last_collect_timestamp_seconds,
            command_runs_total,
        }))
    }

    pub fn inc_cycle(&self, source: &str) {
        self.collect_cycles_total.with_label_values(&[source]).inc();
    }

    pub fn inc_collect_error(&self, source: &str, kind: &str) {
        self.collect_errors_total
            .with_label_values(&[source, kind])
            .inc();
    }

    pub fn inc_fallback(&self, source: &str, part: &str) {
        self.fallback_total.with_label_values(&[source, part]).inc();
    }

    pub fn inc_delivery(&self, source: &str) {
        self.deliveries_total.with_label_values(&[source]).inc();
        self.last_collect_timestamp_seconds
            .with_label_values(&[source])
            .set(now_unix() as f64);
    }

    pub fn inc_command_run(&self, program: &str, outcome: &str) {
        self.command_runs_total
            .with_label_values(&[program, outcome])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let buf = self.encode_metrics()?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_labelled_series() {
        let metrics = Metrics::new().expect("registry");
        metrics.inc_cycle("hal");
        metrics.inc_cycle("hal");
        metrics.inc_collect_error("hal", "unavailable");
        metrics.inc_fallback("framework", "api_calls");
        metrics.inc_delivery("hal");
        metrics.inc_command_run("lshal", "ok");

        let text = metrics.render().expect("render");
        assert!(text.contains("aosprobe_collect_cycles_total{source=\"hal\"} 2"));
        assert!(text.contains("aosprobe_collect_errors_total{kind=\"unavailable\",source=\"hal\"} 1"));
        assert!(text.contains("aosprobe_fallback_total{part=\"api_calls\",source=\"framework\"} 1"));
        assert!(text.contains("aosprobe_command_runs_total{outcome=\"ok\",program=\"lshal\"} 1"));
        assert!(text.contains("aosprobe_last_collect_timestamp_seconds{source=\"hal\"}"));
    }
}
