use super::{Cycle, Payload, Source};
use crate::cpu::{CpuUsage, CpuUsageTracker};
use crate::error::CollectError;
use crate::parsers::device::{classify_network, parse_battery_level, NetworkStatus};
use crate::parsers::proc::{parse_meminfo, CpuStat};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";
const BATTERY: &str = "battery";
const NETWORK: &str = "network";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub cpu: CpuUsage,
    pub memory_available_mb: Option<u64>,
    pub battery_percent: Option<u32>,
    pub network: NetworkStatus,
}

impl SystemInfo {
    pub fn cpu_label(&self) -> String {
        format!("CPU: {}", self.cpu)
    }

    pub fn memory_label(&self) -> String {
        match self.memory_available_mb {
            Some(mb) => format!("Available Memory: {mb} MB"),
            None => "Available Memory: N/A".to_string(),
        }
    }

    pub fn battery_label(&self) -> String {
        match self.battery_percent {
            Some(p) => format!("Battery: {p}%"),
            None => "Battery: N/A".to_string(),
        }
    }

    pub fn network_label(&self) -> String {
        match self.network {
            NetworkStatus::NotConnected => "Not connected".to_string(),
            other => format!("Connected: {other}"),
        }
    }
}

impl Payload for SystemInfo {
    fn is_empty(&self) -> bool {
        false
    }
}

/// CPU load, free memory, battery level and the active transport.
pub struct SystemInfoSource {
    sysfs_root: PathBuf,
    tracker: CpuUsageTracker,
}

impl SystemInfoSource {
    pub fn new(sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            tracker: CpuUsageTracker::new(),
        }
    }

    /// sysfs capacity first, `dumpsys battery` when that is missing.
    async fn battery(&self, cycle: &Cycle) -> Result<Option<u32>, CollectError> {
        let capacity = self.sysfs_root.join("class/power_supply/battery/capacity");
        if let Ok(text) = tokio::fs::read_to_string(&capacity).await {
            if let Some(level) = parse_battery_level([format!("level: {}", text.trim())]) {
                return Ok(Some(level));
            }
        }
        let lines = cycle.executor().lines("dumpsys", &["battery"]).await?;
        Ok(parse_battery_level(&lines))
    }
}

#[async_trait]
impl Source for SystemInfoSource {
    type Output = SystemInfo;

    fn name(&self) -> &'static str {
        "system"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[CPU, MEMORY, BATTERY, NETWORK]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<SystemInfo, CollectError> {
        let stat = cycle
            .provider()
            .cpu_info()
            .await
            .map(|line| CpuStat::parse(&line));
        let cpu = match cycle.recover(CPU, stat, || None)? {
            Some(stat) => self.tracker.observe(stat.sample()),
            None => CpuUsage::Unavailable,
        };

        let memory = cycle
            .provider()
            .mem_info()
            .await
            .map(|text| parse_meminfo(&text).get("MemAvailable").map(|kb| kb / 1024));
        let memory_available_mb = cycle.recover(MEMORY, memory, || None)?;

        let battery = self.battery(cycle).await;
        let battery_percent = cycle.recover(BATTERY, battery, || None)?;

        let network = network_status(&self.sysfs_root).await.map(Some);
        let network = cycle
            .recover(NETWORK, network, || None)?
            .unwrap_or(NetworkStatus::NotConnected);

        Ok(SystemInfo {
            cpu,
            memory_available_mb,
            battery_percent,
            network,
        })
    }

    fn placeholder(&self, _now_ms: i64) -> SystemInfo {
        SystemInfo {
            cpu: CpuUsage::Unavailable,
            memory_available_mb: None,
            battery_percent: None,
            network: NetworkStatus::NotConnected,
        }
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}

/// Reads `class/net/<iface>/operstate` for every interface.
async fn network_status(sysfs_root: &Path) -> Result<NetworkStatus, CollectError> {
    let dir = sysfs_root.join("class/net");
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|source| CollectError::Io {
            what: dir.display().to_string(),
            source,
        })?;

    let mut interfaces = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let state = tokio::fs::read_to_string(entry.path().join("operstate"))
            .await
            .unwrap_or_default();
        interfaces.push((name, state));
    }
    Ok(classify_network(interfaces))
}
