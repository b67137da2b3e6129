use super::{Cycle, Payload, Source};
use crate::cpu::{CpuUsage, CpuUsageTracker};
use crate::error::CollectError;
use crate::parsers::proc::{parse_meminfo, parse_status, CpuStat};
use crate::synthetic;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

const CPU: &str = "cpu";
const MEMORY: &str = "memory";
const PROCESS: &str = "process";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeSnapshot {
    pub cpu: BTreeMap<String, u64>,
    pub cpu_usage: CpuUsage,
    pub memory: BTreeMap<String, u64>,
    pub process: BTreeMap<String, String>,
}

impl Payload for NativeSnapshot {
    fn is_empty(&self) -> bool {
        self.cpu.is_empty() && self.memory.is_empty() && self.process.is_empty()
    }
}

/// Kernel counters read through the telemetry provider.
pub struct NativeSource {
    pid: u32,
    tracker: CpuUsageTracker,
}

impl NativeSource {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            tracker: CpuUsageTracker::new(),
        }
    }
}

#[async_trait]
impl Source for NativeSource {
    type Output = NativeSnapshot;

    fn name(&self) -> &'static str {
        "native"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[CPU, MEMORY, PROCESS]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<NativeSnapshot, CollectError> {
        let stat = cycle
            .provider()
            .cpu_info()
            .await
            .map(|line| CpuStat::parse(&line));
        let stat = cycle.recover(CPU, stat, || None)?;
        let cpu_usage = match stat {
            Some(stat) => self.tracker.observe(stat.sample()),
            None => CpuUsage::Unavailable,
        };
        let cpu = match stat {
            Some(stat) => stat.as_map(),
            None => synthetic::native_cpu(),
        };

        let memory = cycle.provider().mem_info().await.map(|t| parse_meminfo(&t));
        let memory = cycle.recover(MEMORY, memory, synthetic::native_memory)?;

        let process = cycle
            .provider()
            .process_info(self.pid)
            .await
            .map(|t| parse_status(&t));
        let process = cycle.recover(PROCESS, process, synthetic::native_process)?;

        Ok(NativeSnapshot {
            cpu,
            cpu_usage,
            memory,
            process,
        })
    }

    fn placeholder(&self, _now_ms: i64) -> NativeSnapshot {
        NativeSnapshot {
            cpu: synthetic::native_cpu(),
            cpu_usage: CpuUsage::Unavailable,
            memory: synthetic::native_memory(),
            process: synthetic::native_process(),
        }
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{testing, Origin};
    use crate::provider::tests::fake_procfs;

    #[tokio::test]
    async fn reads_all_three_parts() {
        let procfs = fake_procfs();
        let (_tx, mut cycle) = testing::cycle("native", procfs.path());
        let mut source = NativeSource::new(42);
        let snap = source.collect(&mut cycle).await.expect("collect");
        assert_eq!(snap.cpu["user"], 4705);
        assert_eq!(snap.cpu_usage, CpuUsage::Unavailable);
        assert_eq!(snap.memory["MemFree"], 102400);
        assert_eq!(snap.memory.len(), 5);
        assert_eq!(snap.process["Name"], "probe");
        assert_eq!(cycle.origin(source.parts()), Origin::Collected);

        let again = source.collect(&mut cycle).await.expect("collect");
        assert_eq!(again.cpu_usage, CpuUsage::Percent(0));
    }

    #[tokio::test]
    async fn missing_process_is_partial() {
        let procfs = fake_procfs();
        let (_tx, mut cycle) = testing::cycle("native", procfs.path());
        let mut source = NativeSource::new(7);
        let snap = source.collect(&mut cycle).await.expect("collect");
        assert_eq!(snap.process, synthetic::native_process());
        assert_eq!(cycle.origin(source.parts()), Origin::Partial(vec![PROCESS]));
    }

    #[tokio::test]
    async fn unavailable_provider_is_synthetic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("native", &dir.path().join("missing"));
        let source_ref = NativeSource::new(1);
        let mut source = NativeSource::new(1);
        let snap = source.collect(&mut cycle).await.expect("collect");
        assert_eq!(snap, source_ref.placeholder(0));
        assert_eq!(cycle.origin(source.parts()), Origin::Synthetic);
    }
}
