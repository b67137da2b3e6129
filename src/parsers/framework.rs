use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const MAX_BINDER_TRANSACTIONS: usize = 50;

pub const DEFAULT_API_NAME: &str = "android.app.ActivityManager.getRunningAppProcesses";
pub const DEFAULT_API_CALLER: &str = "com.android.settings";
pub const DEFAULT_API_DURATION_MS: u64 = 5;

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"code (0[xX][0-9a-fA-F]+|\d+)").expect("valid regex"));
static DEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"to ([0-9a-fx]+)").expect("valid regex"));
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data: (\d+) bytes").expect("valid regex"));
static API_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"api=(\S+)").expect("valid regex"));
static PKG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pkg=(\S+)").expect("valid regex"));
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*ms\b").expect("valid regex"));
static SERVICE_RECORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ServiceRecord\{\S+\s+\S+\s+([^}\s]+)\}").expect("valid regex"));
static CLIENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"client=([^\s}]+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinderTransaction {
    pub pid: i32,
    pub process: String,
    pub transaction_code: u32,
    pub destination: String,
    pub data_size: u64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCallInfo {
    pub api_name: String,
    pub caller_package: String,
    pub timestamp_ms: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceManagerData {
    /// Service component name to `Running` / `Stopped`.
    pub running_services: BTreeMap<String, String>,
    /// (client package, service) pairs.
    pub service_connections: Vec<(String, String)>,
}

/// Parses binder transaction dumps.
///
/// ```text
/// Process 1234: system_server
///   transaction 0x1a to 0x2f code 7 (data: 1024 bytes)
/// ```
///
/// Lines before the first valid `Process` header and transaction lines
/// without a code are ignored. Only the newest
/// [`MAX_BINDER_TRANSACTIONS`] entries are kept.
pub fn parse_binder_transactions<I, S>(lines: I, now_ms: i64) -> Vec<BinderTransaction>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    let mut pid: i32 = -1;
    let mut process = String::new();

    for line in lines {
        let line = line.as_ref();
        if line.starts_with("Process") {
            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() >= 2 {
                pid = parts[1].replace(':', "").parse().unwrap_or(-1);
                process = parts.get(2).map(|s| s.to_string()).unwrap_or_default();
            }
        } else if line.contains("transaction") && pid > 0 {
            let Some(code) = extract_code(line) else {
                continue;
            };
            out.push(BinderTransaction {
                pid,
                process: process.clone(),
                transaction_code: code,
                destination: DEST_RE
                    .captures(line)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                data_size: SIZE_RE
                    .captures(line)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0),
                timestamp_ms: now_ms,
            });
        }
    }

    if out.len() > MAX_BINDER_TRANSACTIONS {
        out.drain(..out.len() - MAX_BINDER_TRANSACTIONS);
    }
    out
}

fn extract_code(line: &str) -> Option<u32> {
    let raw = CODE_RE.captures(line)?.get(1)?.as_str();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// Summaries from `dumpsys activity` that mention `API calls`.
///
/// `api=`, `pkg=` and `<n>ms` tokens are picked up when present; otherwise
/// the documented defaults are used.
pub fn parse_api_calls<I, S>(lines: I, now_ms: i64) -> Vec<ApiCallInfo>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter(|l| l.as_ref().contains("API calls"))
        .map(|l| {
            let line = l.as_ref();
            ApiCallInfo {
                api_name: API_RE
                    .captures(line)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| DEFAULT_API_NAME.to_string()),
                caller_package: PKG_RE
                    .captures(line)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| DEFAULT_API_CALLER.to_string()),
                timestamp_ms: now_ms,
                duration_ms: DURATION_RE
                    .captures(line)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(DEFAULT_API_DURATION_MS),
            }
        })
        .collect()
}

/// Parses `dumpsys activity services`.
pub fn parse_service_records<I, S>(lines: I) -> ServiceManagerData
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut data = ServiceManagerData::default();
    let mut current = String::new();

    for line in lines {
        let line = line.as_ref();
        if line.contains("* ServiceRecord{") {
            let Some(name) = SERVICE_RECORD_RE.captures(line).map(|c| c[1].to_string()) else {
                continue;
            };
            let state = if line.contains("running") {
                "Running"
            } else {
                "Stopped"
            };
            data.running_services.insert(name.clone(), state.to_string());
            current = name;
        } else if line.contains("ConnectionRecord{") && !current.is_empty() {
            if let Some(client) = CLIENT_RE.captures(line).map(|c| c[1].to_string()) {
                data.service_connections.push((client, current.clone()));
            }
        }
    }

    data
}
