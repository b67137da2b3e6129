//! Periodic collectors and the sources they poll.

pub mod diagnostics;
pub mod framework;
pub mod hal;
pub mod logcat;
pub mod native;
pub mod network;
pub mod scheduler;
pub mod security;
pub mod system;
pub mod tcp;

pub use scheduler::{Collector, CollectorSettings, Lifecycle};

use crate::error::CollectError;
use crate::exec::CommandExecutor;
use crate::metrics::Metrics;
use crate::provider::TelemetryProvider;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Where the data of a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "parts", rename_all = "snake_case")]
pub enum Origin {
    Collected,
    /// Real data with the named parts replaced by placeholders.
    Partial(Vec<&'static str>),
    Synthetic,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<T> {
    pub source: &'static str,
    pub seq: u64,
    pub collected_at_ms: i64,
    pub origin: Origin,
    pub data: T,
}

pub trait Payload {
    /// True when the value carries no records at all.
    fn is_empty(&self) -> bool;
}

impl<T> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<T> Payload for Option<T> {
    fn is_empty(&self) -> bool {
        self.is_none()
    }
}

impl<K, V> Payload for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl<T> Payload for BTreeSet<T> {
    fn is_empty(&self) -> bool {
        BTreeSet::is_empty(self)
    }
}

/// One pollable origin of data.
#[async_trait]
pub trait Source: Send + 'static {
    type Output: Payload + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Parts that can be substituted one at a time through
    /// [`Cycle::fallback`]. When all of them were, the snapshot counts as
    /// synthetic.
    fn parts(&self) -> &'static [&'static str] {
        &[]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<Self::Output, CollectError>;

    fn placeholder(&self, now_ms: i64) -> Self::Output;

    /// Forgets state carried between cycles.
    fn reset(&mut self) {}
}

/// Everything one cycle of a source may use.
pub struct Cycle {
    source: &'static str,
    executor: CommandExecutor,
    provider: Arc<dyn TelemetryProvider>,
    now_ms: i64,
    substituted: Vec<&'static str>,
    metrics: Option<Arc<Metrics>>,
}

impl Cycle {
    pub fn new(
        source: &'static str,
        executor: CommandExecutor,
        provider: Arc<dyn TelemetryProvider>,
        now_ms: i64,
    ) -> Self {
        Self {
            source,
            executor,
            provider,
            now_ms,
            substituted: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn provider(&self) -> &dyn TelemetryProvider {
        self.provider.as_ref()
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    /// Keeps `value` unless it is empty, in which case the placeholder is
    /// used and `part` is recorded as substituted.
    pub fn fallback<T, F>(&mut self, part: &'static str, value: T, placeholder: F) -> T
    where
        T: Payload,
        F: FnOnce() -> T,
    {
        if !value.is_empty() {
            return value;
        }
        debug!(source = self.source, part, "no records, using placeholder");
        self.substitute(part);
        placeholder()
    }

    /// Like [`fallback`](Self::fallback) for a fallible step. Cancellation
    /// is passed through, every other error is logged and substituted.
    pub fn recover<T, F>(
        &mut self,
        part: &'static str,
        result: Result<T, CollectError>,
        placeholder: F,
    ) -> Result<T, CollectError>
    where
        T: Payload,
        F: FnOnce() -> T,
    {
        match result {
            Ok(value) => Ok(self.fallback(part, value, placeholder)),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                debug!(source = self.source, part, error = %err, "part failed, using placeholder");
                self.substitute(part);
                Ok(placeholder())
            }
        }
    }

    pub fn substituted(&self) -> &[&'static str] {
        &self.substituted
    }

    /// Records `part` as replaced by its placeholder.
    pub(crate) fn substitute(&mut self, part: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_fallback(self.source, part);
        }
        if !self.substituted.contains(&part) {
            self.substituted.push(part);
        }
    }

    fn origin(&self, parts: &[&'static str]) -> Origin {
        if self.substituted.is_empty() {
            Origin::Collected
        } else if !parts.is_empty() && parts.iter().all(|p| self.substituted.contains(p)) {
            Origin::Synthetic
        } else {
            Origin::Partial(self.substituted.clone())
        }
    }
}

/// Turns a command failure into "no output" so the caller's defaults apply.
/// Cancellation is still reported.
pub(crate) fn lines_or_empty(
    source: &'static str,
    result: Result<Vec<String>, CollectError>,
) -> Result<Vec<String>, CollectError> {
    match result {
        Ok(lines) => Ok(lines),
        Err(err) if err.is_cancelled() => Err(err),
        Err(err) => {
            debug!(source, error = %err, "command failed");
            Ok(Vec::new())
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
