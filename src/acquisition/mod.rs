//! Telemetry acquisition
//!
//! Abstracts the external sensor API behind [`TelemetrySource`] so the
//! poller, the backfill controller and the passthrough endpoints do not
//! care whether readings come over HTTP or from memory.

mod http_source;

pub use http_source::HttpTelemetrySource;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

use crate::types::Reading;

/// Telemetry source errors. Callers in the core treat every variant as
/// "no data".
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Source returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Read-only contract of the external telemetry source.
///
/// Every call is idempotent. Historical calls return readings newest-last.
#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Latest reading, `None` when the source has nothing yet.
    async fn fetch_current(&self) -> Result<Option<Reading>, SourceError>;

    /// Most recent `n` readings.
    async fn fetch_latest(&self, n: usize) -> Result<Vec<Reading>, SourceError>;

    /// Entire historical corpus.
    async fn fetch_all(&self) -> Result<Vec<Reading>, SourceError>;

    async fn health_check(&self) -> bool;

    /// Source-specific status document, passed through untouched.
    async fn fetch_status(&self) -> Result<serde_json::Value, SourceError>;

    /// Channel names the source publishes.
    async fn fetch_sensors(&self) -> Result<Vec<String>, SourceError>;

    /// Current value of one named sensor, as the source reports it.
    /// [`SourceError::NotFound`] when the source does not know the name.
    async fn fetch_sensor(&self, name: &str) -> Result<serde_json::Value, SourceError>;

    /// Human-readable name for logging (e.g. "HTTP", "static").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Static Source (in-memory history)
// ============================================================================

/// Serves a fixed in-memory history. `fetch_current` walks forward through
/// `live` one reading per call.
#[derive(Debug)]
pub struct StaticSource {
    history: Vec<Reading>,
    live: Mutex<std::vec::IntoIter<Reading>>,
    healthy: bool,
    latest_requests: Mutex<Vec<usize>>,
    all_calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(history: Vec<Reading>) -> Self {
        Self {
            history,
            live: Mutex::new(Vec::new().into_iter()),
            healthy: true,
            latest_requests: Mutex::new(Vec::new()),
            all_calls: AtomicUsize::new(0),
        }
    }

    /// Source that fails every call.
    pub fn unavailable() -> Self {
        Self {
            healthy: false,
            ..Self::new(Vec::new())
        }
    }

    #[must_use]
    pub fn with_live(self, live: Vec<Reading>) -> Self {
        Self {
            live: Mutex::new(live.into_iter()),
            ..self
        }
    }

    /// Number of `fetch_latest` calls served so far.
    pub fn latest_calls(&self) -> usize {
        self.latest_log().len()
    }

    /// The `n` of every `fetch_latest` call, in call order.
    pub fn latest_requests(&self) -> Vec<usize> {
        self.latest_log().clone()
    }

    fn latest_log(&self) -> std::sync::MutexGuard<'_, Vec<usize>> {
        self.latest_requests.lock().unwrap_or_else(|e| {
            warn!("Mutex poisoned on static source request log, recovering");
            e.into_inner()
        })
    }

    /// Number of `fetch_all` calls served so far.
    pub fn all_calls(&self) -> usize {
        self.all_calls.load(Ordering::Relaxed)
    }

    fn ensure_healthy(&self) -> Result<(), SourceError> {
        if self.healthy {
            Ok(())
        } else {
            Err(SourceError::Unavailable("static source marked unavailable".to_string()))
        }
    }
}

#[async_trait]
impl TelemetrySource for StaticSource {
    async fn fetch_current(&self) -> Result<Option<Reading>, SourceError> {
        self.ensure_healthy()?;
        let mut live = self.live.lock().unwrap_or_else(|e| {
            warn!("Mutex poisoned on static source, recovering");
            e.into_inner()
        });
        Ok(live.next().or_else(|| self.history.last().cloned()))
    }

    async fn fetch_latest(&self, n: usize) -> Result<Vec<Reading>, SourceError> {
        self.latest_log().push(n);
        self.ensure_healthy()?;
        let skip = self.history.len().saturating_sub(n);
        Ok(self.history[skip..].to_vec())
    }

    async fn fetch_all(&self) -> Result<Vec<Reading>, SourceError> {
        self.all_calls.fetch_add(1, Ordering::Relaxed);
        self.ensure_healthy()?;
        Ok(self.history.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    async fn fetch_status(&self) -> Result<serde_json::Value, SourceError> {
        self.ensure_healthy()?;
        Ok(serde_json::json!({
            "source": "static",
            "total_records": self.history.len(),
        }))
    }

    async fn fetch_sensors(&self) -> Result<Vec<String>, SourceError> {
        self.ensure_healthy()?;
        Ok(crate::types::Channel::ALL
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    async fn fetch_sensor(&self, name: &str) -> Result<serde_json::Value, SourceError> {
        self.ensure_healthy()?;
        let channel = crate::types::Channel::from_name(name)
            .ok_or_else(|| SourceError::NotFound(format!("sensor '{name}'")))?;
        let current = self
            .history
            .last()
            .ok_or_else(|| SourceError::NotFound("no current reading".to_string()))?;
        Ok(serde_json::json!({
            "sensor_name": channel.name(),
            "value": current.get(channel),
        }))
    }

    fn source_name(&self) -> &str {
        "static"
    }
}
