//! Ingestion Pipeline
//!
//! ```text
//! poll source ─► raw buffer ─► preprocess last N raw ─► processed buffer
//! ```
//!
//! Every polled reading lands in the raw buffer. The processed buffer gets
//! one point per reading: the last output of preprocessing the most recent
//! `window` raw readings, or the reading itself while the raw buffer is too
//! short to smooth.

mod poller;

pub use poller::{Poller, PollerStats};

use crate::buffer::TelemetryStore;
use crate::config::defaults::MIN_POINTS_FOR_SMOOTHING;
use crate::preprocessing::Preprocessor;
use crate::types::Reading;

/// Append `reading` to the raw buffer and one derived point to the
/// processed buffer. Returns the processed point, if any.
///
/// When every reading in the recent window is downtime the last one is
/// still appended, so the processed buffer always advances.
pub fn ingest(
    store: &TelemetryStore,
    preprocessor: &Preprocessor,
    window: usize,
    reading: Reading,
) -> Option<Reading> {
    let recent = {
        let mut raw = store.raw_mut();
        raw.push(reading.clone());
        if raw.len() < MIN_POINTS_FOR_SMOOTHING {
            None
        } else {
            Some(raw.tail(window.max(1)))
        }
    };

    let point = match recent {
        Some(recent) => preprocessor.run(&recent).pop()?,
        None => reading,
    };
    store.processed_mut().push(point.clone());
    Some(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;

    fn reading(speed: f64) -> Reading {
        Reading::new([1.0, 400.0, 120.0, speed, 100.0, 3.5, 15.0])
    }

    #[test]
    fn test_first_readings_pass_through() {
        let store = TelemetryStore::new(60);
        let pre = Preprocessor::default();

        let p1 = ingest(&store, &pre, 10, reading(100.0)).unwrap();
        let p2 = ingest(&store, &pre, 10, reading(110.0)).unwrap();
        assert_eq!(p1.get(Channel::TblSpeed), 100.0);
        assert_eq!(p2.get(Channel::TblSpeed), 110.0);
        assert_eq!(store.raw_len(), 2);
        assert_eq!(store.processed_len(), 2);
    }

    #[test]
    fn test_third_reading_is_smoothed() {
        let store = TelemetryStore::new(60);
        let pre = Preprocessor::default();
        for speed in [100.0, 110.0] {
            ingest(&store, &pre, 10, reading(speed));
        }
        let p3 = ingest(&store, &pre, 10, reading(120.0)).unwrap();
        assert!((p3.get(Channel::TblSpeed) - 110.0).abs() < 1e-9);
        assert_eq!(store.processed_len(), 3);
    }

    #[test]
    fn test_downtime_window_still_advances() {
        let store = TelemetryStore::new(60);
        let pre = Preprocessor::default();
        let idle = Reading::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        for _ in 0..5 {
            assert!(ingest(&store, &pre, 10, idle.clone()).is_some());
        }
        assert_eq!(store.processed_len(), 5);
    }

    #[test]
    fn test_buffers_bounded_by_capacity() {
        let store = TelemetryStore::new(4);
        let pre = Preprocessor::default();
        for i in 0..10 {
            ingest(&store, &pre, 10, reading(100.0 + f64::from(i)));
        }
        assert_eq!(store.raw_len(), 4);
        assert_eq!(store.processed_len(), 4);
        assert_eq!(store.raw().latest().unwrap().get(Channel::TblSpeed), 109.0);
    }
}
