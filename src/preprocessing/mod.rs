//! Preprocessing pipeline: gap fill → downtime exclusion → causal smoothing
//!
//! Operates on an owned copy of a raw window and never fails. An empty
//! window yields an empty output; any non-empty window yields at least one
//! reading.

use tracing::debug;

use crate::config::{defaults, DowntimeConfig};
use crate::types::{Channel, Reading, CHANNEL_COUNT};

// ============================================================================
// Gap Fill
// ============================================================================

/// Resolve non-finite channel values in place.
///
/// Per channel, in priority order: last finite value before the gap, first
/// finite value after it, then the schema default.
pub fn gap_fill(window: &mut [Reading]) {
    for channel in Channel::ALL {
        let idx = channel.index();

        let mut last_valid: Option<f64> = None;
        for reading in window.iter_mut() {
            let v = reading.values[idx];
            if v.is_finite() {
                last_valid = Some(v);
            } else if let Some(fill) = last_valid {
                reading.values[idx] = fill;
            }
        }

        let mut next_valid: Option<f64> = None;
        for reading in window.iter_mut().rev() {
            let v = reading.values[idx];
            if v.is_finite() {
                next_valid = Some(v);
            } else {
                reading.values[idx] = next_valid.unwrap_or_else(|| channel.default_value());
            }
        }
    }
}

// ============================================================================
// Downtime Exclusion
// ============================================================================

/// True when the line is not producing at this reading.
pub fn is_downtime(reading: &Reading, thresholds: &DowntimeConfig) -> bool {
    reading.get(Channel::TblSpeed) <= thresholds.min_tbl_speed
        || reading.get(Channel::Produced) <= thresholds.min_produced
        || reading.get(Channel::Waste) < thresholds.min_waste
}

/// Drop downtime readings. When every reading is downtime, the most recent
/// one is kept so the output is never empty.
pub fn exclude_downtime(window: Vec<Reading>, thresholds: &DowntimeConfig) -> Vec<Reading> {
    let Some(last) = window.last().cloned() else {
        return window;
    };
    let before = window.len();
    let kept: Vec<Reading> = window
        .into_iter()
        .filter(|r| !is_downtime(r, thresholds))
        .collect();

    if kept.is_empty() {
        debug!(window = before, "Entire window is downtime, keeping last reading");
        vec![last]
    } else {
        kept
    }
}

// ============================================================================
// Smoothing
// ============================================================================

/// 3-tap causal moving average.
///
/// Point 0 is unchanged, point 1 is the mean of points 0..=1, and point
/// `i >= 2` is the mean of points `i-2..=i`. Each output keeps its input's
/// timestamp.
pub fn smooth(window: &[Reading]) -> Vec<Reading> {
    window
        .iter()
        .enumerate()
        .map(|(i, reading)| {
            let start = i.saturating_sub(2);
            let taps = &window[start..=i];
            let n = taps.len() as f64;
            let mut values = [0.0_f64; CHANNEL_COUNT];
            for tap in taps {
                for (acc, v) in values.iter_mut().zip(tap.values.iter()) {
                    *acc += v;
                }
            }
            Reading {
                timestamp: reading.timestamp,
                values: values.map(|v| v / n),
            }
        })
        .collect()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Full preprocessing pipeline with the line's downtime thresholds.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    downtime: DowntimeConfig,
}

impl Preprocessor {
    pub const fn new(downtime: DowntimeConfig) -> Self {
        Self { downtime }
    }

    /// Run gap fill, downtime exclusion and smoothing over `window`.
    ///
    /// Smoothing is skipped when fewer than three readings survive
    /// exclusion.
    pub fn run(&self, window: &[Reading]) -> Vec<Reading> {
        if window.is_empty() {
            return Vec::new();
        }

        let mut filled = window.to_vec();
        gap_fill(&mut filled);

        let clean = exclude_downtime(filled, &self.downtime);
        if clean.len() >= defaults::MIN_POINTS_FOR_SMOOTHING {
            smooth(&clean)
        } else {
            clean
        }
    }
}
