use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("valid regex"));

pub const DEFAULT_HW_SERVER: &str = "system_server";
pub const DEFAULT_HW_CLIENTS: [&str; 2] = ["com.android.systemui", "com.android.settings"];

/// Libraries reported for a device that advertises a VNDK version. Listing
/// the real directory needs root.
pub const VNDK_CORE_LIBRARIES: [&str; 5] = [
    "libc++.so",
    "libhardware.so",
    "libhidlbase.so",
    "libutils.so",
    "libcutils.so",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HalKind {
    #[serde(rename = "HIDL")]
    Hidl,
    #[serde(rename = "AIDL")]
    Aidl,
}

impl HalKind {
    /// HIDL names carry a `@major.minor` package version, AIDL names do not.
    pub fn classify(name: &str) -> Self {
        if name.contains('@') {
            Self::Hidl
        } else {
            Self::Aidl
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HalInterface {
    pub name: String,
    pub version: String,
    pub kind: HalKind,
    pub implementation: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HwService {
    pub name: String,
    pub server: String,
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VndkInfo {
    pub version: String,
    pub libraries: Vec<String>,
}

/// Parses the table printed by `lshal`.
///
/// Everything up to the header row (the one naming both `Interface` and
/// `Transport`) is skipped; rows with fewer than five columns are ignored.
pub fn parse_lshal<I, S>(lines: I) -> Vec<HalInterface>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    let mut in_table = false;

    for line in lines {
        let line = line.as_ref();
        if !in_table {
            if line.contains("Interface") && line.contains("Transport") {
                in_table = true;
            }
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let name = parts[0];
        let running = parts.last().is_some_and(|p| p.contains("running"));
        out.push(HalInterface {
            name: name.to_string(),
            version: VERSION_RE
                .find(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            kind: HalKind::classify(name),
            implementation: parts[2].to_string(),
            status: if running { "Running" } else { "Stopped" }.to_string(),
        });
    }

    out
}

/// Parses `service list`: `<index>\t<name>: [<descriptor>]`.
pub fn parse_service_list<I, S>(lines: I) -> Vec<HwService>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref();
            let (head, _descriptor) = line.split_once(": [")?;
            let head = head.trim();
            let name = match head.split_once(char::is_whitespace) {
                Some((idx, rest)) if idx.chars().all(|c| c.is_ascii_digit()) => rest.trim(),
                _ => head,
            };
            if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(HwService {
                name: name.to_string(),
                server: DEFAULT_HW_SERVER.to_string(),
                clients: DEFAULT_HW_CLIENTS.iter().map(|c| c.to_string()).collect(),
            })
        })
        .collect()
}

/// `getprop ro.vndk.version`; blank means the property is unset.
pub fn parse_vndk_version(line: Option<&str>) -> Option<String> {
    line.map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

pub fn vndk_info(version: String) -> VndkInfo {
    VndkInfo {
        version,
        libraries: VNDK_CORE_LIBRARIES.iter().map(|l| l.to_string()).collect(),
    }
}
