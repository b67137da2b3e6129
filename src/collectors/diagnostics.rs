use super::{Cycle, Payload, Source};
use crate::error::CollectError;
use crate::parsers::device::{parse_process_names, parse_screen_on};
use crate::parsers::proc::parse_meminfo;
use async_trait::async_trait;
use serde::Serialize;

const PROCESSES: &str = "processes";
const MEMORY: &str = "memory";
const SCREEN: &str = "screen";
const MEMINFO: &str = "meminfo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsInfo {
    pub running_processes: Vec<String>,
    pub available_memory: String,
    pub screen_on: bool,
    pub dumpsys_result: String,
}

impl Payload for DiagnosticsInfo {
    fn is_empty(&self) -> bool {
        false
    }
}

/// Process list, free memory, screen state and the raw `dumpsys meminfo`.
#[derive(Debug, Default)]
pub struct DiagnosticsSource;

impl DiagnosticsSource {
    pub fn new() -> Self {
        Self
    }
}

/// Raw answers behind one diagnostics snapshot.
struct Answers {
    ps: Result<Vec<String>, CollectError>,
    meminfo: Result<String, CollectError>,
    power: Result<Vec<String>, CollectError>,
    dumpsys_meminfo: Result<Vec<String>, CollectError>,
}

fn memory_label(available_mb: Option<u64>) -> String {
    match available_mb {
        Some(mb) => format!("Available: {mb} MB"),
        None => "Available: N/A".to_string(),
    }
}

fn assemble(cycle: &mut Cycle, answers: Answers) -> Result<DiagnosticsInfo, CollectError> {
    let running_processes = cycle.recover(
        PROCESSES,
        answers.ps.map(|lines| parse_process_names(lines)),
        Vec::new,
    )?;
    let available_mb = cycle.recover(
        MEMORY,
        answers
            .meminfo
            .map(|text| parse_meminfo(&text).get("MemAvailable").map(|kb| kb / 1024)),
        || None,
    )?;
    let power = cycle.recover(SCREEN, answers.power, Vec::new)?;

    let dumpsys_result = match answers.dumpsys_meminfo {
        Ok(lines) if !lines.is_empty() => lines.join("\n"),
        Ok(_) => {
            cycle.substitute(MEMINFO);
            String::new()
        }
        Err(err) if err.is_cancelled() => return Err(err),
        Err(err) => {
            cycle.substitute(MEMINFO);
            format!("Error reading dumpsys: {err}")
        }
    };

    Ok(DiagnosticsInfo {
        running_processes,
        available_memory: memory_label(available_mb),
        screen_on: parse_screen_on(&power),
        dumpsys_result,
    })
}

#[async_trait]
impl Source for DiagnosticsSource {
    type Output = DiagnosticsInfo;

    fn name(&self) -> &'static str {
        "diagnostics"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[PROCESSES, MEMORY, SCREEN, MEMINFO]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<DiagnosticsInfo, CollectError> {
        let exec = cycle.executor().clone();
        let answers = Answers {
            ps: exec.lines("ps", &["-A", "-o", "NAME"]).await,
            meminfo: cycle.provider().mem_info().await,
            power: exec.lines("dumpsys", &["power"]).await,
            dumpsys_meminfo: exec.lines("dumpsys", &["meminfo"]).await,
        };
        assemble(cycle, answers)
    }

    fn placeholder(&self, _now_ms: i64) -> DiagnosticsInfo {
        DiagnosticsInfo {
            running_processes: Vec::new(),
            available_memory: memory_label(None),
            screen_on: false,
            dumpsys_result: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{testing, Origin};
    use crate::provider::tests::fake_procfs;

    #[tokio::test]
    async fn memory_comes_from_provider() {
        let procfs = fake_procfs();
        let (_tx, mut cycle) = testing::cycle("diagnostics", procfs.path());
        let info = DiagnosticsSource::new()
            .collect(&mut cycle)
            .await
            .expect("collect");
        assert_eq!(info.available_memory, "Available: 1483 MB");
    }

    fn unavailable(program: &str) -> CollectError {
        CollectError::Unavailable {
            program: program.to_string(),
            reason: "not installed".to_string(),
        }
    }

    #[test]
    fn every_failed_part_is_synthetic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("diagnostics", dir.path());
        let answers = Answers {
            ps: Err(unavailable("ps")),
            meminfo: Err(unavailable("procfs")),
            power: Ok(Vec::new()),
            dumpsys_meminfo: Err(unavailable("dumpsys")),
        };
        let info = assemble(&mut cycle, answers).expect("assemble");
        assert!(info.running_processes.is_empty());
        assert_eq!(info.available_memory, "Available: N/A");
        assert!(info.dumpsys_result.starts_with("Error reading dumpsys:"));
        assert_eq!(cycle.origin(DiagnosticsSource.parts()), Origin::Synthetic);
    }

    #[test]
    fn real_parts_keep_collected_origin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("diagnostics", dir.path());
        let owned = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let answers = Answers {
            ps: Ok(owned(&["NAME", "init", "surfaceflinger"])),
            meminfo: Ok("MemAvailable: 2097152 kB".to_string()),
            power: Ok(owned(&["  mWakefulness=Awake"])),
            dumpsys_meminfo: Ok(owned(&["Total RAM: 3,891,044K"])),
        };
        let info = assemble(&mut cycle, answers).expect("assemble");
        assert_eq!(info.running_processes, vec!["init", "surfaceflinger"]);
        assert_eq!(info.available_memory, "Available: 2048 MB");
        assert!(info.screen_on);
        assert_eq!(info.dumpsys_result, "Total RAM: 3,891,044K");
        assert_eq!(cycle.origin(DiagnosticsSource.parts()), Origin::Collected);
    }

    #[tokio::test]
    async fn cancelled_cycle_reports_cancellation() {
        let procfs = fake_procfs();
        let (tx, mut cycle) = testing::cycle("diagnostics", procfs.path());
        tx.send(true).expect("send");
        let err = DiagnosticsSource::new()
            .collect(&mut cycle)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
