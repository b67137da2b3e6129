//! The native telemetry provider: kernel counters exposed as plain text or
//! JSON strings, the way the collectors consume them.

use crate::error::CollectError;
use crate::parsers::net::{InterfaceStats, RawTcpEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};

const PROVIDER: &str = "procfs";
const MEMINFO_LINES: usize = 5;

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// The aggregate `cpu` line.
    async fn cpu_info(&self) -> Result<String, CollectError>;
    /// The head of the memory report, one `key: value kB` per line.
    async fn mem_info(&self) -> Result<String, CollectError>;
    async fn process_info(&self, pid: u32) -> Result<String, CollectError>;
    /// JSON object keyed by interface name. Loopback is left out.
    async fn network_stats(&self) -> Result<String, CollectError>;
    /// JSON array of `{local_address, remote_address, state, uid, inode}`.
    async fn tcp_connections(&self) -> Result<String, CollectError>;
}

fn readiness() -> &'static Mutex<HashMap<PathBuf, bool>> {
    static READY: OnceLock<Mutex<HashMap<PathBuf, bool>>> = OnceLock::new();
    READY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// One-time initialisation of the provider rooted at `root`.
///
/// The first call probes `<root>/stat` and remembers the answer; later calls
/// only look it up.
pub async fn ensure_native_ready(root: &Path) -> Result<(), CollectError> {
    let known = readiness()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(root)
        .copied();
    let ok = match known {
        Some(ok) => ok,
        None => {
            let stat = root.join("stat");
            let probed = tokio::fs::File::open(&stat).await;
            let mut ready = readiness().lock().unwrap_or_else(|e| e.into_inner());
            // A concurrent first call may have answered already.
            if let Some(ok) = ready.get(root) {
                *ok
            } else {
                let ok = match probed {
                    Ok(_) => {
                        info!(root = %root.display(), "native telemetry provider ready");
                        true
                    }
                    Err(err) => {
                        warn!(path = %stat.display(), error = %err, "native telemetry provider unavailable");
                        false
                    }
                };
                ready.insert(root.to_path_buf(), ok);
                ok
            }
        }
    };
    if ok {
        Ok(())
    } else {
        Err(CollectError::Unavailable {
            program: PROVIDER.to_string(),
            reason: format!("{} is not readable", root.join("stat").display()),
        })
    }
}

/// Reads the live procfs tree (or a copy of one in tests).
#[derive(Debug, Clone)]
pub struct ProcfsProvider {
    root: PathBuf,
}

impl ProcfsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read(&self, rel: &str) -> Result<String, CollectError> {
        ensure_native_ready(&self.root).await?;
        let path = self.root.join(rel);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CollectError::Io {
                what: path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl TelemetryProvider for ProcfsProvider {
    async fn cpu_info(&self) -> Result<String, CollectError> {
        let text = self.read("stat").await?;
        Ok(text.lines().next().unwrap_or_default().to_string())
    }

    async fn mem_info(&self) -> Result<String, CollectError> {
        let text = self.read("meminfo").await?;
        Ok(text
            .lines()
            .take(MEMINFO_LINES)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn process_info(&self, pid: u32) -> Result<String, CollectError> {
        self.read(&format!("{pid}/status")).await
    }

    async fn network_stats(&self) -> Result<String, CollectError> {
        let text = self.read("net/dev").await?;
        encode("network stats", &net_dev_to_stats(&text))
    }

    async fn tcp_connections(&self) -> Result<String, CollectError> {
        let text = self.read("net/tcp").await?;
        encode("tcp connections", &net_tcp_to_entries(&text))
    }
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> Result<String, CollectError> {
    serde_json::to_string(value).map_err(|source| CollectError::Decode {
        what: what.to_string(),
        source,
    })
}

/// `/proc/net/dev`: two header rows, then `iface: rx(8 cols) tx(8 cols)`.
fn net_dev_to_stats(text: &str) -> BTreeMap<String, InterfaceStats> {
    text.lines()
        .skip(2)
        .filter_map(|line| {
            let (name, counters) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name == "lo" {
                return None;
            }
            let v: Vec<u64> = counters
                .split_whitespace()
                .map(|t| t.parse().unwrap_or(0))
                .collect();
            if v.len() < 12 {
                return None;
            }
            Some((
                name.to_string(),
                InterfaceStats {
                    rx_bytes: v[0],
                    rx_packets: v[1],
                    rx_errors: v[2],
                    rx_dropped: v[3],
                    tx_bytes: v[8],
                    tx_packets: v[9],
                    tx_errors: v[10],
                    tx_dropped: v[11],
                },
            ))
        })
        .collect()
}

/// `/proc/net/tcp`: `sl local rem st tx:rx tr:when retr uid timeout inode`.
fn net_tcp_to_entries(text: &str) -> Vec<RawTcpEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 10 {
                return None;
            }
            Some(RawTcpEntry {
                local_address: cols[1].to_string(),
                remote_address: cols[2].to_string(),
                state: cols[3].to_string(),
                uid: cols[7].parse().unwrap_or(0),
                inode: cols[9].parse().unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parsers::net::{decode_interface_stats, decode_tcp_connections};
    use std::fs;
    use tempfile::TempDir;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
 wlan0: 52428800   1500    2    0    0     0          0         0 10485760     800    0    1    0     0       0          0
";

    const NET_TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20001 1 0000000000000000 100 0 0 10 0
   1: 6401A8C0:B26E 6EC4FA8E:01BB 01 00000000:00000000 02:000A7D4E 00000000 10123        0 31337 2 0000000000000000 20 4 30 10 -1
";

    /// A fake procfs tree with the files the provider reads.
    pub(crate) fn fake_procfs() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::write(
            root.join("stat"),
            "cpu  4705 356 584 3699 23 0 12 0 0 0\ncpu0 1 2 3 4 5 6 7 0 0 0\n",
        )
        .expect("stat");
        fs::write(
            root.join("meminfo"),
            "MemTotal: 3891044 kB\nMemFree: 102400 kB\nMemAvailable: 1519224 kB\nBuffers: 1024 kB\nCached: 2048 kB\nSwapCached: 0 kB\n",
        )
        .expect("meminfo");
        fs::create_dir_all(root.join("net")).expect("net dir");
        fs::write(root.join("net/dev"), NET_DEV).expect("net/dev");
        fs::write(root.join("net/tcp"), NET_TCP).expect("net/tcp");
        fs::create_dir_all(root.join("42")).expect("pid dir");
        fs::write(root.join("42/status"), "Name:\tprobe\nState:\tS (sleeping)\nThreads:\t4\n")
            .expect("status");
        dir
    }

    #[tokio::test]
    async fn reads_cpu_and_memory_heads() {
        let dir = fake_procfs();
        let provider = ProcfsProvider::new(dir.path());
        assert_eq!(
            provider.cpu_info().await.expect("cpu"),
            "cpu  4705 356 584 3699 23 0 12 0 0 0"
        );
        let mem = provider.mem_info().await.expect("mem");
        assert_eq!(mem.lines().count(), MEMINFO_LINES);
        assert!(!mem.contains("SwapCached"));
        let status = provider.process_info(42).await.expect("status");
        assert!(status.starts_with("Name:\tprobe"));
    }

    #[tokio::test]
    async fn network_json_skips_loopback() {
        let dir = fake_procfs();
        let provider = ProcfsProvider::new(dir.path());
        let json = provider.network_stats().await.expect("net");
        let stats = decode_interface_stats(&json).expect("decode");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats["wlan0"].rx_bytes, 52_428_800);
        assert_eq!(stats["wlan0"].tx_packets, 800);
        assert_eq!(stats["wlan0"].tx_dropped, 1);
    }

    #[tokio::test]
    async fn tcp_json_round_trips_through_codec() {
        let dir = fake_procfs();
        let provider = ProcfsProvider::new(dir.path());
        let json = provider.tcp_connections().await.expect("tcp");
        let conns = decode_tcp_connections(&json).expect("decode");
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].local_address, "127.0.0.1:80");
        assert_eq!(conns[0].status, "LISTEN");
        assert_eq!(conns[1].uid, 10123);
        assert_eq!(conns[1].remote_address, "142.250.196.110:443");
    }

    #[tokio::test]
    async fn missing_root_is_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let provider = ProcfsProvider::new(dir.path().join("nope"));
        let err = provider.cpu_info().await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        // The answer is remembered even once the tree appears.
        fs::create_dir_all(dir.path().join("nope")).expect("mkdir");
        fs::write(dir.path().join("nope/stat"), "cpu 1 1 1 1 1 1 1\n").expect("stat");
        assert_eq!(provider.cpu_info().await.unwrap_err().kind(), "unavailable");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_agree() {
        let dir = fake_procfs();
        let root = dir.path().to_path_buf();
        let calls: Vec<_> = (0..8)
            .map(|_| {
                let root = root.clone();
                tokio::spawn(async move { ensure_native_ready(&root).await.is_ok() })
            })
            .collect();
        for call in calls {
            assert!(call.await.expect("join"));
        }
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = fake_procfs();
        let provider = ProcfsProvider::new(dir.path());
        assert_eq!(provider.process_info(7).await.unwrap_err().kind(), "io");
    }
}
