//! Periodic source poller.
//!
//! Fetches the current reading on a fixed interval and feeds it through
//! [`super::ingest`]. Source failures are logged and skipped; the loop only
//! ends on cancellation.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ingest;
use crate::acquisition::TelemetrySource;
use crate::buffer::TelemetryStore;
use crate::preprocessing::Preprocessor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerStats {
    pub polls: u64,
    pub ingested: u64,
    pub empty: u64,
    pub failures: u64,
}

pub struct Poller {
    source: Arc<dyn TelemetrySource>,
    store: Arc<TelemetryStore>,
    preprocessor: Preprocessor,
    window: usize,
    interval: Duration,
    timeout: Duration,
    cancel_token: CancellationToken,
    stats: PollerStats,
}

impl Poller {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        store: Arc<TelemetryStore>,
        preprocessor: Preprocessor,
        window: usize,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            preprocessor,
            window,
            interval,
            timeout: interval,
            cancel_token,
            stats: PollerStats::default(),
        }
    }

    /// Per-poll timeout; defaults to the poll interval.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn stats(&self) -> PollerStats {
        self.stats
    }

    /// Fetch and ingest one reading. Returns whether a reading was ingested.
    pub async fn poll_once(&mut self) -> bool {
        self.stats.polls += 1;

        let fetched = tokio::time::timeout(self.timeout, self.source.fetch_current()).await;
        let reading = match fetched {
            Ok(Ok(Some(reading))) => reading,
            Ok(Ok(None)) => {
                self.stats.empty += 1;
                debug!("[Poller] Source has no current reading");
                return false;
            }
            Ok(Err(e)) => {
                self.stats.failures += 1;
                warn!("[Poller] Fetch from {} failed: {}", self.source.source_name(), e);
                return false;
            }
            Err(_) => {
                self.stats.failures += 1;
                warn!("[Poller] Fetch from {} timed out after {:?}", self.source.source_name(), self.timeout);
                return false;
            }
        };

        let reading = match reading.timestamp {
            Some(_) => reading,
            None => reading.with_timestamp(Utc::now()),
        };
        if !reading.is_complete() {
            debug!("[Poller] Reading has gaps, preprocessing will fill them");
        }

        ingest(&self.store, &self.preprocessor, self.window, reading);
        self.stats.ingested += 1;
        true
    }

    /// Poll until cancelled.
    pub async fn run(mut self) -> PollerStats {
        info!(
            "[Poller] Polling {} every {:?} (window {})",
            self.source.source_name(),
            self.interval,
            self.window
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel_token = self.cancel_token.clone();

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("[Poller] Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                    if self.stats.polls % 60 == 0 {
                        info!(
                            "[Poller] {} polls | ingested: {} | failures: {} | buffer: {}/{}",
                            self.stats.polls,
                            self.stats.ingested,
                            self.stats.failures,
                            self.store.raw_len(),
                            self.store.capacity()
                        );
                    }
                }
            }
        }

        info!(
            "[Poller] Stopped after {} polls ({} ingested, {} failures)",
            self.stats.polls, self.stats.ingested, self.stats.failures
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::StaticSource;
    use crate::types::{Channel, Reading};

    fn reading(speed: f64) -> Reading {
        Reading::new([1.0, 400.0, 120.0, speed, 100.0, 3.5, 15.0])
    }

    fn poller(source: StaticSource, store: Arc<TelemetryStore>, interval: Duration) -> (Poller, CancellationToken) {
        let token = CancellationToken::new();
        let poller = Poller::new(
            Arc::new(source),
            store,
            Preprocessor::default(),
            10,
            interval,
            token.clone(),
        );
        (poller, token)
    }

    #[tokio::test]
    async fn test_poll_once_stamps_and_ingests() {
        let store = Arc::new(TelemetryStore::new(60));
        let source = StaticSource::new(Vec::new()).with_live(vec![reading(100.0)]);
        let (mut poller, _) = poller(source, Arc::clone(&store), Duration::from_secs(1));

        assert!(poller.poll_once().await);
        let latest = store.raw().latest().cloned().unwrap();
        assert!(latest.timestamp.is_some());
        assert_eq!(latest.get(Channel::TblSpeed), 100.0);
        assert_eq!(store.processed_len(), 1);

        // live feed and history both exhausted
        assert!(!poller.poll_once().await);
        assert_eq!(poller.stats().empty, 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_counted_not_fatal() {
        let store = Arc::new(TelemetryStore::new(60));
        let (mut poller, _) = poller(StaticSource::unavailable(), Arc::clone(&store), Duration::from_secs(1));

        assert!(!poller.poll_once().await);
        assert!(!poller.poll_once().await);
        assert_eq!(poller.stats().failures, 2);
        assert_eq!(store.raw_len(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(TelemetryStore::new(60));
        let source = StaticSource::new(vec![reading(100.0)]);
        let (poller, token) = poller(source, Arc::clone(&store), Duration::from_millis(5));

        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_millis(40)).await;
        token.cancel();

        let stats = handle.await.unwrap();
        assert!(stats.polls >= 1);
        assert_eq!(stats.ingested, stats.polls);
        assert_eq!(store.raw_len() as u64, stats.ingested.min(60));
    }
}
