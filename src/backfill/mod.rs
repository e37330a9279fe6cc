//! Backfill Controller
//!
//! Tops up the raw buffer with historical readings when an operation needs
//! more history than has been polled so far.
//!
//! Protocol:
//! 1. shortfall = target - buffered
//! 2. `fetch_latest(shortfall)` merged in front of the buffer
//! 3. still short: `fetch_all()` and merge the newest readings older than
//!    the buffer
//! 4. still short: `InsufficientHistory`
//!
//! Source errors and timeouts count as zero points returned.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::acquisition::TelemetrySource;
use crate::buffer::TelemetryStore;
use crate::types::Reading;

/// Minimum raw history an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequirement(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("need {required} readings, have {available} after backfill")]
pub struct InsufficientHistory {
    pub required: usize,
    pub available: usize,
}

/// What a backfill pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct BackfillOutcome {
    pub added_from_latest: usize,
    pub added_from_all: usize,
    pub buffered: usize,
}

impl BackfillOutcome {
    pub const fn added(&self) -> usize {
        self.added_from_latest + self.added_from_all
    }
}

pub struct BackfillController {
    source: Arc<dyn TelemetrySource>,
    timeout: Duration,
}

impl BackfillController {
    pub fn new(source: Arc<dyn TelemetrySource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Ensure the raw buffer holds at least `requirement` readings.
    ///
    /// A no-op when it already does. The target is capped at buffer
    /// capacity.
    pub async fn ensure(
        &self,
        store: &TelemetryStore,
        requirement: HistoryRequirement,
    ) -> Result<BackfillOutcome, InsufficientHistory> {
        let required = requirement.0;
        let outcome = self.fill_to(store, required).await;
        if outcome.buffered >= required {
            Ok(outcome)
        } else {
            warn!(
                required,
                available = outcome.buffered,
                "Insufficient history after backfill"
            );
            Err(InsufficientHistory {
                required,
                available: outcome.buffered,
            })
        }
    }

    /// Backfill towards `target` readings without failing when short.
    pub async fn fill_to(&self, store: &TelemetryStore, target: usize) -> BackfillOutcome {
        let target = target.min(store.capacity());
        let mut outcome = BackfillOutcome {
            buffered: store.raw_len(),
            ..BackfillOutcome::default()
        };

        let shortfall = target.saturating_sub(outcome.buffered);
        if shortfall == 0 {
            return outcome;
        }

        debug!(shortfall, target, source = self.source.source_name(), "Backfilling raw buffer");
        let latest = self.fetch("latest", self.source.fetch_latest(shortfall)).await;
        outcome.added_from_latest = store.raw_mut().prepend_older(&latest, shortfall);
        outcome.buffered = store.raw_len();

        if outcome.buffered < target {
            let all = self.fetch("all", self.source.fetch_all()).await;
            let remaining = target - outcome.buffered;
            // filtered against the buffer before the newest `remaining` are taken
            outcome.added_from_all = store.raw_mut().prepend_older(&all, remaining);
            outcome.buffered = store.raw_len();
        }

        if outcome.added() > 0 {
            info!(
                from_latest = outcome.added_from_latest,
                from_all = outcome.added_from_all,
                buffered = outcome.buffered,
                "Backfilled raw buffer"
            );
        }
        outcome
    }

    async fn fetch<F>(&self, what: &str, call: F) -> Vec<Reading>
    where
        F: std::future::Future<Output = Result<Vec<Reading>, crate::acquisition::SourceError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(readings)) => readings,
            Ok(Err(e)) => {
                warn!(call = what, error = %e, "Backfill fetch failed, treating as empty");
                Vec::new()
            }
            Err(_) => {
                warn!(call = what, timeout_secs = self.timeout.as_secs(), "Backfill fetch timed out, treating as empty");
                Vec::new()
            }
        }
    }
}
