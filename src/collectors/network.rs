use super::{Cycle, Source};
use crate::error::CollectError;
use crate::parsers::net::{decode_interface_stats, InterfaceStats};
use crate::synthetic;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Per-interface traffic counters.
#[derive(Debug, Default)]
pub struct NetworkStatsSource;

impl NetworkStatsSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Source for NetworkStatsSource {
    type Output = BTreeMap<String, InterfaceStats>;

    fn name(&self) -> &'static str {
        "network_stats"
    }

    async fn collect(
        &mut self,
        cycle: &mut Cycle,
    ) -> Result<BTreeMap<String, InterfaceStats>, CollectError> {
        let json = cycle.provider().network_stats().await?;
        decode_interface_stats(&json)
    }

    fn placeholder(&self, _now_ms: i64) -> BTreeMap<String, InterfaceStats> {
        synthetic::interface_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing;
    use crate::provider::tests::fake_procfs;

    #[tokio::test]
    async fn decodes_provider_json() {
        let procfs = fake_procfs();
        let (_tx, mut cycle) = testing::cycle("network_stats", procfs.path());
        let stats = NetworkStatsSource::new()
            .collect(&mut cycle)
            .await
            .expect("collect");
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["wlan0"]);
        assert_eq!(stats["wlan0"].formatted_rx(), "50 MB");
        assert_eq!(stats["wlan0"].formatted_tx(), "10 MB");
        assert!(!synthetic::is_synthetic_interface("wlan0"));
    }
}
