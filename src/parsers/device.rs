use super::parse_u64_loose;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    NotConnected,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotConnected => "Not Connected",
            Self::Wifi => "Wi-Fi",
            Self::Cellular => "Cellular",
            Self::Ethernet => "Ethernet",
            Self::Other => "Connected",
        })
    }
}

impl NetworkStatus {
    fn of_interface(name: &str) -> Self {
        if name.starts_with("wlan") || name.starts_with("wifi") {
            Self::Wifi
        } else if name.starts_with("rmnet") || name.starts_with("ccmni") || name.starts_with("pdp") {
            Self::Cellular
        } else if name.starts_with("eth") {
            Self::Ethernet
        } else {
            Self::Other
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Wifi => 4,
            Self::Cellular => 3,
            Self::Ethernet => 2,
            Self::Other => 1,
            Self::NotConnected => 0,
        }
    }
}

/// Picks the active transport from `(interface, operstate)` pairs.
///
/// Loopback and interfaces that are not `up` are ignored. When several are
/// up, Wi-Fi wins over cellular, cellular over ethernet.
pub fn classify_network<I, N, S>(interfaces: I) -> NetworkStatus
where
    I: IntoIterator<Item = (N, S)>,
    N: AsRef<str>,
    S: AsRef<str>,
{
    interfaces
        .into_iter()
        .filter(|(name, state)| name.as_ref() != "lo" && state.as_ref().trim() == "up")
        .map(|(name, _)| NetworkStatus::of_interface(name.as_ref()))
        .max_by_key(|s| s.rank())
        .unwrap_or(NetworkStatus::NotConnected)
}

/// `ps -A -o NAME`: a header row, then one name per line.
pub fn parse_process_names<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .skip(1)
        .filter_map(|l| l.as_ref().split_whitespace().last().map(str::to_string))
        .collect()
}

/// Screen state from `dumpsys power`.
pub fn parse_screen_on<I, S>(lines: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines.into_iter().any(|l| {
        let l = l.as_ref().trim();
        l == "mWakefulness=Awake" || l.contains("Display Power: state=ON")
    })
}

/// `level: 85` from `dumpsys battery`.
pub fn parse_battery_level<I, S>(lines: I) -> Option<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines.into_iter().find_map(|l| {
        let rest = l.as_ref().trim().strip_prefix("level:")?;
        parse_u64_loose(rest)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v <= 100)
    })
}
