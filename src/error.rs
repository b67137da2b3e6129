use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} is unavailable: {reason}")]
    Unavailable { program: String, reason: String },
    #[error("i/o error while reading {what}: {source}")]
    Io { what: String, source: io::Error },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("collection cancelled")]
    Cancelled,
    #[error("{name} panicked while collecting")]
    Panicked { name: &'static str },
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        source: serde_json::Error,
    },
}

impl CollectError {
    pub(crate) fn from_spawn(program: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Self::Unavailable {
                program: program.to_string(),
                reason: source.to_string(),
            },
            _ => Self::Spawn {
                program: program.to_string(),
                source,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Unavailable { .. } => "unavailable",
            Self::Io { .. } => "io",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked { .. } => "panic",
            Self::Decode { .. } => "decode",
        }
    }
}
