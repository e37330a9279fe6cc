//! Forecast Sequence Builder
//!
//! Fixed-length forecaster input built from any window length.

use crate::types::{Reading, CHANNEL_COUNT};

/// Exactly `len` readings, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSequence {
    readings: Vec<Reading>,
}

impl ForecastSequence {
    /// Build a sequence of exactly `len` readings from `window`.
    ///
    /// Longer windows keep their most recent `len` readings. Shorter windows
    /// are front-padded with copies of their earliest reading; an empty
    /// window becomes `len` schema-default readings.
    pub fn build(window: &[Reading], len: usize) -> Self {
        if window.len() >= len {
            return Self {
                readings: window[window.len() - len..].to_vec(),
            };
        }

        let pad = window.first().cloned().unwrap_or_else(Reading::defaults);
        let mut readings = Vec::with_capacity(len);
        readings.extend(std::iter::repeat(pad).take(len - window.len()));
        readings.extend_from_slice(window);
        Self { readings }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Row-major `[len][CHANNEL_COUNT]` matrix.
    pub fn to_matrix(&self) -> Vec<[f64; CHANNEL_COUNT]> {
        self.readings.iter().map(|r| r.values).collect()
    }
}
