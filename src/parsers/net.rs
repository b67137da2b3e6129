use crate::codec::{decode_address, tcp_state_name};
use crate::error::CollectError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters of one interface as published by the telemetry provider.
/// Missing fields decode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

impl InterfaceStats {
    pub fn formatted_rx(&self) -> String {
        format_bytes(self.rx_bytes)
    }

    pub fn formatted_tx(&self) -> String {
        format_bytes(self.tx_bytes)
    }
}

/// Wire form of one `/proc/net/tcp` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTcpEntry {
    pub local_address: String,
    pub remote_address: String,
    pub state: String,
    pub uid: u32,
    pub inode: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpConnection {
    pub local_address: String,
    pub remote_address: String,
    pub status: String,
    pub uid: u32,
}

impl From<RawTcpEntry> for TcpConnection {
    fn from(raw: RawTcpEntry) -> Self {
        Self {
            local_address: decode_address(&raw.local_address),
            remote_address: decode_address(&raw.remote_address),
            status: tcp_state_name(&raw.state).to_string(),
            uid: raw.uid,
        }
    }
}

pub fn decode_interface_stats(json: &str) -> Result<BTreeMap<String, InterfaceStats>, CollectError> {
    serde_json::from_str(json).map_err(|source| CollectError::Decode {
        what: "network stats".to_string(),
        source,
    })
}

pub fn decode_tcp_connections(json: &str) -> Result<Vec<TcpConnection>, CollectError> {
    let raw: Vec<RawTcpEntry> =
        serde_json::from_str(json).map_err(|source| CollectError::Decode {
            what: "tcp connections".to_string(),
            source,
        })?;
    Ok(raw.into_iter().map(TcpConnection::from).collect())
}

/// Binary units, truncated: `1536` is `1 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{} KB", b / KB),
        b if b < GB => format!("{} MB", b / MB),
        b => format!("{} GB", b / GB),
    }
}
