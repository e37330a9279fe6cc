//! Bounded telemetry history
//!
//! Two fixed-capacity rings back every prediction:
//! - **raw**: readings exactly as received (after missing-channel defaults)
//! - **processed**: readings that survived downtime exclusion and smoothing
//!
//! Appends evict the oldest reading once capacity is reached. Prediction
//! requests copy a snapshot out so they never hold a lock across inference.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::config::RequirementsConfig;
use crate::types::{BufferStatus, Readiness, Reading};

// ============================================================================
// Ring Buffer
// ============================================================================

/// Fixed-capacity FIFO of readings, oldest first.
#[derive(Debug, Clone)]
pub struct TelemetryBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl TelemetryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append the newest reading, evicting the oldest when full.
    pub fn push(&mut self, reading: Reading) {
        if self.capacity == 0 {
            return;
        }
        while self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    /// Merge historical readings (oldest first) in front of the buffered ones.
    ///
    /// Only readings strictly older than the oldest buffered timestamp
    /// qualify; once the buffer is timestamped, untimestamped history cannot
    /// be placed and is skipped. Of the qualifying readings at most `max`
    /// free slots are filled, keeping the most recent. Returns how many
    /// readings were added.
    pub fn prepend_older(&mut self, older: &[Reading], max: usize) -> usize {
        let cutoff = self.readings.front().and_then(|r| r.timestamp);
        let candidates: Vec<&Reading> = older
            .iter()
            .filter(|r| match (r.timestamp, cutoff) {
                (Some(ts), Some(cut)) => ts < cut,
                (None, Some(_)) => false,
                (_, None) => true,
            })
            .collect();

        let free = self.capacity.saturating_sub(self.readings.len()).min(max);
        let take = free.min(candidates.len());
        for reading in candidates[candidates.len() - take..].iter().rev() {
            self.readings.push_front((*reading).clone());
        }
        take
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The `n` most recent readings, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Reading> {
        let skip = self.readings.len().saturating_sub(n);
        self.readings.iter().skip(skip).cloned().collect()
    }

    /// Copy of the whole buffer, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }
}

// ============================================================================
// Shared Store
// ============================================================================

/// Raw and processed buffers shared between the ingestion task and the
/// request handlers.
#[derive(Debug)]
pub struct TelemetryStore {
    raw: RwLock<TelemetryBuffer>,
    processed: RwLock<TelemetryBuffer>,
    capacity: usize,
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            raw: RwLock::new(TelemetryBuffer::new(capacity)),
            processed: RwLock::new(TelemetryBuffer::new(capacity)),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn raw(&self) -> RwLockReadGuard<'_, TelemetryBuffer> {
        self.raw.read().unwrap_or_else(|e| {
            warn!("RwLock poisoned on raw buffer read, recovering");
            e.into_inner()
        })
    }

    pub fn raw_mut(&self) -> RwLockWriteGuard<'_, TelemetryBuffer> {
        self.raw.write().unwrap_or_else(|e| {
            warn!("RwLock poisoned on raw buffer write, recovering");
            e.into_inner()
        })
    }

    pub fn processed(&self) -> RwLockReadGuard<'_, TelemetryBuffer> {
        self.processed.read().unwrap_or_else(|e| {
            warn!("RwLock poisoned on processed buffer read, recovering");
            e.into_inner()
        })
    }

    pub fn processed_mut(&self) -> RwLockWriteGuard<'_, TelemetryBuffer> {
        self.processed.write().unwrap_or_else(|e| {
            warn!("RwLock poisoned on processed buffer write, recovering");
            e.into_inner()
        })
    }

    pub fn raw_snapshot(&self) -> Vec<Reading> {
        self.raw().snapshot()
    }

    pub fn processed_snapshot(&self) -> Vec<Reading> {
        self.processed().snapshot()
    }

    pub fn raw_len(&self) -> usize {
        self.raw().len()
    }

    pub fn processed_len(&self) -> usize {
        self.processed().len()
    }

    /// Fill levels plus per-operation readiness.
    ///
    /// Readiness is judged on the larger of the two buffers.
    pub fn status(&self, requirements: &RequirementsConfig) -> BufferStatus {
        let raw_size = self.raw_len();
        let processed_size = self.processed_len();
        let available = raw_size.max(processed_size);

        BufferStatus {
            raw_size,
            processed_size,
            capacity: self.capacity,
            readiness: Readiness {
                forecast_ready: available >= requirements.forecast,
                classification_ready: available >= requirements.classification,
                policy_ready: available >= requirements.policy.max(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reading_at(minute: i64, waste: f64) -> Reading {
        let base = Utc.with_ymd_and_hms(2025, 7, 8, 12, 0, 0).unwrap();
        let mut r = Reading::defaults().with_timestamp(base + Duration::minutes(minute));
        r.values[0] = waste;
        r
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut buf = TelemetryBuffer::new(3);
        for i in 0..5 {
            buf.push(reading_at(i, i as f64));
        }
        assert_eq!(buf.len(), 3);
        let wastes: Vec<f64> = buf.snapshot().iter().map(|r| r.values[0]).collect();
        assert_eq!(wastes, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_tail_returns_most_recent_in_order() {
        let mut buf = TelemetryBuffer::new(10);
        for i in 0..6 {
            buf.push(reading_at(i, i as f64));
        }
        let wastes: Vec<f64> = buf.tail(3).iter().map(|r| r.values[0]).collect();
        assert_eq!(wastes, [3.0, 4.0, 5.0]);
        assert_eq!(buf.tail(100).len(), 6);
    }

    #[test]
    fn test_prepend_older_fills_free_slots_and_skips_overlap() {
        let mut buf = TelemetryBuffer::new(5);
        buf.push(reading_at(10, 10.0));
        buf.push(reading_at(11, 11.0));

        // minute 10 overlaps the buffered range and must be dropped
        let history: Vec<Reading> = (5..=10).map(|m| reading_at(m, m as f64)).collect();
        let added = buf.prepend_older(&history, usize::MAX);

        assert_eq!(added, 3);
        let wastes: Vec<f64> = buf.snapshot().iter().map(|r| r.values[0]).collect();
        assert_eq!(wastes, [7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_prepend_older_skips_untimestamped_history_once_stamped() {
        let mut buf = TelemetryBuffer::new(10);
        buf.push(reading_at(10, 10.0));

        let mut history: Vec<Reading> = (7..=10).map(|m| reading_at(m, m as f64)).collect();
        history.push(Reading::defaults());
        assert_eq!(buf.prepend_older(&history, usize::MAX), 3);
        let wastes: Vec<f64> = buf.snapshot().iter().map(|r| r.values[0]).collect();
        assert_eq!(wastes, [7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_prepend_older_respects_limit() {
        let mut buf = TelemetryBuffer::new(10);
        buf.push(reading_at(10, 10.0));
        let history: Vec<Reading> = (0..10).map(|m| reading_at(m, m as f64)).collect();
        assert_eq!(buf.prepend_older(&history, 2), 2);
        let wastes: Vec<f64> = buf.snapshot().iter().map(|r| r.values[0]).collect();
        assert_eq!(wastes, [8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_prepend_older_into_full_buffer_is_noop() {
        let mut buf = TelemetryBuffer::new(2);
        buf.push(reading_at(10, 1.0));
        buf.push(reading_at(11, 2.0));
        assert_eq!(buf.prepend_older(&[reading_at(1, 0.0)], usize::MAX), 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_status_readiness_uses_larger_buffer() {
        let store = TelemetryStore::new(60);
        let requirements = RequirementsConfig::default();

        let empty = store.status(&requirements);
        assert!(!empty.readiness.policy_ready);

        for i in 0..5 {
            store.raw_mut().push(reading_at(i, 0.0));
        }
        store.processed_mut().push(reading_at(4, 0.0));

        let status = store.status(&requirements);
        assert_eq!(status.raw_size, 5);
        assert_eq!(status.processed_size, 1);
        assert!(status.readiness.classification_ready);
        assert!(status.readiness.policy_ready);
        assert!(!status.readiness.forecast_ready);
    }
}
