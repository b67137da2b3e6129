use crate::cpu::CpuSample;
use serde::Serialize;
use std::collections::BTreeMap;

/// The aggregate `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CpuStat {
    pub const FIELDS: [&'static str; 7] =
        ["user", "nice", "system", "idle", "iowait", "irq", "softirq"];

    /// Parses `cpu  user nice system idle iowait irq softirq ...`.
    ///
    /// Needs the label plus seven fields; a field that is not a number counts
    /// as zero.
    pub fn parse(line: &str) -> Option<Self> {
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 8 {
            return None;
        }
        let v = |i: usize| toks[i].parse::<u64>().unwrap_or(0);
        Some(Self {
            user: v(1),
            nice: v(2),
            system: v(3),
            idle: v(4),
            iowait: v(5),
            irq: v(6),
            softirq: v(7),
        })
    }

    pub fn as_map(&self) -> BTreeMap<String, u64> {
        let values = [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
        ];
        Self::FIELDS
            .iter()
            .zip(values)
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    pub fn sample(&self) -> CpuSample {
        CpuSample {
            total: self
                .user
                .saturating_add(self.nice)
                .saturating_add(self.system)
                .saturating_add(self.idle),
            idle: self.idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KvValue {
    Number(u64),
    Text(String),
}

/// Splits `key: value[ unit]` on the first colon.
///
/// The value is a number when its first token parses as one, otherwise the
/// trimmed text is kept. Lines without a key yield `None`.
pub fn parse_kv_line(line: &str) -> Option<(String, KvValue)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let rest = rest.trim();
    let value = match rest.split_whitespace().next().map(str::parse::<u64>) {
        Some(Ok(n)) => KvValue::Number(n),
        _ => KvValue::Text(rest.to_string()),
    };
    Some((key.to_string(), value))
}

/// `/proc/meminfo` style dumps. Values that are not numeric are kept as 0.
pub fn parse_meminfo(text: &str) -> BTreeMap<String, u64> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_kv_line)
        .map(|(k, v)| match v {
            KvValue::Number(n) => (k, n),
            KvValue::Text(_) => (k, 0),
        })
        .collect()
}

/// `/proc/<pid>/status` style dumps with the raw value text.
pub fn parse_status(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
