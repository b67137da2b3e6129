use serde::Serialize;
use std::fmt;

/// Cumulative jiffy counters taken from one read of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSample {
    pub total: u64,
    pub idle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "percent", rename_all = "snake_case")]
pub enum CpuUsage {
    Unavailable,
    Percent(u8),
}

impl fmt::Display for CpuUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("N/A"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

/// Turns consecutive counter samples into a utilisation percentage.
///
/// The first sample after construction or [`reset`](Self::reset) only primes
/// the tracker and reports [`CpuUsage::Unavailable`].
#[derive(Debug, Default)]
pub struct CpuUsageTracker {
    previous: Option<CpuSample>,
}

impl CpuUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, current: CpuSample) -> CpuUsage {
        let usage = match self.previous {
            None => CpuUsage::Unavailable,
            Some(prev) => {
                let total = current.total.saturating_sub(prev.total);
                let idle = current.idle.saturating_sub(prev.idle);
                if total == 0 {
                    CpuUsage::Percent(0)
                } else {
                    let busy = total.saturating_sub(idle) as u128;
                    let pct = (busy * 100 / total as u128).min(100);
                    CpuUsage::Percent(pct as u8)
                }
            }
        };
        self.previous = Some(current);
        usage
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
