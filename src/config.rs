use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_procfs_root")]
    pub procfs_root: String,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
    /// Upper bound for one external command. Unset means the interval of
    /// the collector running it.
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub native: NativeConfig,
    #[serde(default)]
    pub logcat: LogcatConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    System,
    Diagnostics,
    Security,
    Framework,
    Hal,
    Native,
    NetworkStats,
    Tcp,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        Self::System,
        Self::Diagnostics,
        Self::Security,
        Self::Framework,
        Self::Hal,
        Self::Native,
        Self::NetworkStats,
        Self::Tcp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Diagnostics => "diagnostics",
            Self::Security => "security",
            Self::Framework => "framework",
            Self::Hal => "hal",
            Self::Native => "native",
            Self::NetworkStats => "network_stats",
            Self::Tcp => "tcp",
        }
    }

    pub fn default_interval(self) -> Duration {
        let ms = match self {
            Self::System | Self::Native => 1_000,
            Self::Diagnostics | Self::Framework | Self::NetworkStats => 2_000,
            Self::Tcp => 3_000,
            Self::Security | Self::Hal => 5_000,
        };
        Duration::from_millis(ms)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                ConfigError::Validation(format!(
                    "unknown source '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub system: SourceConfig,
    #[serde(default)]
    pub diagnostics: SourceConfig,
    #[serde(default)]
    pub security: SourceConfig,
    #[serde(default)]
    pub framework: SourceConfig,
    #[serde(default)]
    pub hal: SourceConfig,
    #[serde(default)]
    pub native: SourceConfig,
    #[serde(default)]
    pub network_stats: SourceConfig,
    #[serde(default)]
    pub tcp: SourceConfig,
}

impl SourcesConfig {
    pub fn get(&self, kind: SourceKind) -> &SourceConfig {
        match kind {
            SourceKind::System => &self.system,
            SourceKind::Diagnostics => &self.diagnostics,
            SourceKind::Security => &self.security,
            SourceKind::Framework => &self.framework,
            SourceKind::Hal => &self.hal,
            SourceKind::Native => &self.native,
            SourceKind::NetworkStats => &self.network_stats,
            SourceKind::Tcp => &self.tcp,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NativeConfig {
    /// Process whose status is sampled. Defaults to the probe itself.
    #[serde(default)]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogcatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_buffer_lines")]
    pub buffer_lines: usize,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for LogcatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_lines: default_buffer_lines(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            procfs_root: default_procfs_root(),
            sysfs_root: default_sysfs_root(),
            command_timeout_ms: None,
            sources: SourcesConfig::default(),
            native: NativeConfig::default(),
            logcat: LogcatConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.procfs_root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "procfs_root must not be empty".to_string(),
            ));
        }
        if self.sysfs_root.trim().is_empty() {
            return Err(ConfigError::Validation(
                "sysfs_root must not be empty".to_string(),
            ));
        }
        if self.command_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "command_timeout_ms must be > 0".to_string(),
            ));
        }

        validate_sources(&self.sources)?;
        validate_logcat(&self.logcat)?;

        Ok(())
    }

    pub fn interval(&self, kind: SourceKind) -> Duration {
        self.sources
            .get(kind)
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| kind.default_interval())
    }

    pub fn command_timeout(&self, kind: SourceKind) -> Duration {
        self.command_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.interval(kind))
    }

    pub fn is_enabled(&self, kind: SourceKind) -> bool {
        self.sources.get(kind).enabled
    }

    pub fn native_pid(&self) -> u32 {
        self.native.pid.unwrap_or_else(std::process::id)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_sources(sources: &SourcesConfig) -> Result<(), ConfigError> {
    for kind in SourceKind::ALL {
        if let Some(ms) = sources.get(kind).interval_ms {
            if ms < MIN_INTERVAL_MS {
                return Err(ConfigError::Validation(format!(
                    "sources.{kind}.interval_ms must be >= {MIN_INTERVAL_MS}"
                )));
            }
        }
    }
    Ok(())
}

fn validate_logcat(cfg: &LogcatConfig) -> Result<(), ConfigError> {
    if cfg.buffer_lines < 1 {
        return Err(ConfigError::Validation(
            "logcat.buffer_lines must be >= 1".to_string(),
        ));
    }
    if cfg.restart_delay_ms < MIN_INTERVAL_MS {
        return Err(ConfigError::Validation(format!(
            "logcat.restart_delay_ms must be >= {MIN_INTERVAL_MS}"
        )));
    }
    Ok(())
}

fn default_procfs_root() -> String {
    "/proc".to_string()
}

fn default_sysfs_root() -> String {
    "/sys".to_string()
}

const fn default_enabled() -> bool {
    true
}

const fn default_buffer_lines() -> usize {
    256
}

const fn default_restart_delay_ms() -> u64 {
    1_000
}
