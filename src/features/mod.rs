//! Feature Derivation Engine
//!
//! Summarizes a window of processed readings into the fixed 29-feature
//! vector the defect and quality classifiers were trained on:
//!
//! - **Derived** (15): window statistics over telemetry channels
//! - **Categorical** (5): product/batch descriptors not present in telemetry
//! - **Laboratory** (9): raw-material assay medians from the training set
//!
//! Feature names are part of the trained models' contract and are kept
//! byte-for-byte, including `"main_CompForce mean"` with its embedded space.

use chrono::{Datelike, Utc};
use statrs::statistics::Statistics;

use crate::types::{Channel, Reading};

/// Smallest window features are derived from.
pub const MIN_FEATURE_WINDOW: usize = 5;

/// Leading readings treated as the startup phase.
pub const STARTUP_READINGS: usize = 10;

/// Number of features in the schema.
pub const FEATURE_COUNT: usize = 29;

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Computed from the telemetry window
    Derived,
    /// Product descriptor with a fixed default
    Categorical,
    /// Laboratory assay constant
    Laboratory,
}

/// One named slot in the feature schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
    /// Value used when the feature is not computed from telemetry
    pub default: f64,
}

const fn derived(name: &'static str) -> FeatureSpec {
    FeatureSpec { name, kind: FeatureKind::Derived, default: 0.0 }
}

const fn categorical(name: &'static str, default: f64) -> FeatureSpec {
    FeatureSpec { name, kind: FeatureKind::Categorical, default }
}

const fn laboratory(name: &'static str, default: f64) -> FeatureSpec {
    FeatureSpec { name, kind: FeatureKind::Laboratory, default }
}

/// Classifier feature schema in training column order.
pub const FEATURE_SCHEMA: [FeatureSpec; FEATURE_COUNT] = [
    derived("tbl_speed_mean"),
    derived("tbl_speed_change"),
    derived("total_waste"),
    derived("startup_waste"),
    derived("fom_mean"),
    derived("fom_change"),
    derived("SREL_startup_mean"),
    derived("SREL_production_mean"),
    derived("main_CompForce mean"),
    derived("main_CompForce_sd"),
    derived("pre_CompForce_mean"),
    derived("tbl_fill_mean"),
    derived("tbl_fill_sd"),
    derived("stiffness_mean"),
    derived("ejection_mean"),
    categorical("code", 25.0),
    categorical("strength_encoded", 0.0),
    categorical("weekend_encoded", 0.0),
    categorical("start_month", 0.0),
    categorical("normalization_factor", 1.0),
    laboratory("api_content", 94.4),
    laboratory("lactose_water", 4.5),
    laboratory("smcc_water", 2.8),
    laboratory("smcc_td", 0.5),
    laboratory("smcc_bd", 0.3),
    laboratory("starch_ph", 7.0),
    laboratory("starch_water", 12.0),
    laboratory("tbl_min_thickness", 3.5),
    laboratory("tbl_max_thickness", 4.2),
];

/// Schema position of a feature name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_SCHEMA.iter().position(|spec| spec.name == name)
}

pub fn feature_names() -> impl Iterator<Item = &'static str> {
    FEATURE_SCHEMA.iter().map(|spec| spec.name)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("feature window needs {required} readings, got {available}")]
pub struct InsufficientWindow {
    pub required: usize,
    pub available: usize,
}

// ============================================================================
// Feature Vector
// ============================================================================

/// Values in [`FEATURE_SCHEMA`] order. Always exactly [`FEATURE_COUNT`]
/// finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            values: FEATURE_SCHEMA.map(|spec| spec.default),
        }
    }
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// Set a schema feature; non-finite values are stored as zero.
    /// Returns false for names outside the schema.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match feature_index(name) {
            Some(i) => {
                self.values[i] = if value.is_finite() { value } else { 0.0 };
                true
            }
            None => false,
        }
    }

    pub const fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_SCHEMA
            .iter()
            .zip(self.values.iter())
            .map(|(spec, v)| (spec.name, *v))
    }

    /// Reorder into a model's expected column list. Names outside the
    /// schema are zero-filled.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Vec<f64> {
        names
            .iter()
            .map(|n| self.get(n.as_ref()).unwrap_or(0.0))
            .collect()
    }
}

// ============================================================================
// Derivation
// ============================================================================

fn column(window: &[Reading], channel: Channel) -> Vec<f64> {
    window.iter().map(|r| r.get(channel)).collect()
}

fn range(col: &[f64]) -> f64 {
    Statistics::max(col.iter()) - Statistics::min(col.iter())
}

/// Derive the classifier feature vector from a processed window.
///
/// `start_month` comes from the newest timestamped reading, falling back to
/// the current month.
pub fn derive_features(window: &[Reading]) -> Result<FeatureVector, InsufficientWindow> {
    if window.len() < MIN_FEATURE_WINDOW {
        return Err(InsufficientWindow {
            required: MIN_FEATURE_WINDOW,
            available: window.len(),
        });
    }

    let startup = &window[..window.len().min(STARTUP_READINGS)];

    let tbl_speed = column(window, Channel::TblSpeed);
    let waste = column(window, Channel::Waste);
    let produced = column(window, Channel::Produced);
    let srel = column(window, Channel::Srel);
    let main_comp = column(window, Channel::MainComp);

    let waste_sum: f64 = waste.iter().sum();
    let produced_sum: f64 = produced.iter().sum();
    let main_comp_mean = main_comp.iter().mean();

    let mut fv = FeatureVector::default();
    fv.set("tbl_speed_mean", tbl_speed.iter().mean());
    fv.set("tbl_speed_change", range(&tbl_speed));
    fv.set("total_waste", waste_sum);
    fv.set("startup_waste", startup.iter().map(|r| r.get(Channel::Waste)).sum());
    fv.set("fom_mean", produced_sum / (produced_sum + waste_sum + 1e-6) * 50.0);
    fv.set("fom_change", range(&produced).abs() * 0.1);
    fv.set("SREL_startup_mean", column(startup, Channel::Srel).iter().mean());
    fv.set("SREL_production_mean", srel.iter().mean());
    fv.set("main_CompForce mean", main_comp_mean);
    fv.set("main_CompForce_sd", main_comp.iter().std_dev());
    fv.set("pre_CompForce_mean", main_comp_mean * 0.1);
    fv.set("tbl_fill_mean", produced.iter().mean() / 1000.0);
    fv.set("tbl_fill_sd", produced.iter().std_dev() / 1000.0);
    fv.set("stiffness_mean", column(window, Channel::Stiffness).iter().mean());
    fv.set("ejection_mean", column(window, Channel::Ejection).iter().mean());

    let month = window
        .iter()
        .rev()
        .find_map(|r| r.timestamp)
        .unwrap_or_else(Utc::now)
        .month();
    fv.set("start_month", f64::from(month));

    Ok(fv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(n: usize) -> Vec<Reading> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                Reading::new([x, 100.0 + x, 120.0, 95.0 + x, 100.0, 3.0 + x * 0.1, 15.0 + x])
            })
            .collect()
    }

    #[test]
    fn test_schema_shape() {
        assert_eq!(FEATURE_SCHEMA.len(), FEATURE_COUNT);
        assert_eq!(feature_index("tbl_speed_mean"), Some(0));
        assert_eq!(feature_index("main_CompForce mean"), Some(8));
        assert_eq!(feature_index("main_CompForce_mean"), None);
        let derived = FEATURE_SCHEMA.iter().filter(|s| s.kind == FeatureKind::Derived).count();
        assert_eq!(derived, 15);
    }

    #[test]
    fn test_insufficient_window() {
        let err = derive_features(&window(4)).unwrap_err();
        assert_eq!(err, InsufficientWindow { required: 5, available: 4 });
    }

    #[test]
    fn test_vector_length_independent_of_window() {
        for n in [5, 12, 60] {
            let fv = derive_features(&window(n)).unwrap();
            assert_eq!(fv.as_slice().len(), FEATURE_COUNT);
            let names: Vec<&str> = fv.iter().map(|(n, _)| n).collect();
            assert_eq!(names, feature_names().collect::<Vec<_>>());
            assert!(fv.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_derived_values() {
        let fv = derive_features(&window(12)).unwrap();

        assert!((fv.get("tbl_speed_mean").unwrap() - 100.5).abs() < 1e-9);
        assert!((fv.get("tbl_speed_change").unwrap() - 11.0).abs() < 1e-9);
        assert!((fv.get("total_waste").unwrap() - 66.0).abs() < 1e-9);
        // waste 0..=9 in the startup phase
        assert!((fv.get("startup_waste").unwrap() - 45.0).abs() < 1e-9);
        assert!((fv.get("fom_change").unwrap() - 1.1).abs() < 1e-9);
        assert!((fv.get("pre_CompForce_mean").unwrap() - 2.05).abs() < 1e-9);
        assert!((fv.get("tbl_fill_mean").unwrap() - 0.1055).abs() < 1e-9);
        assert_eq!(fv.get("code"), Some(25.0));
        assert_eq!(fv.get("api_content"), Some(94.4));
        assert_eq!(fv.get("normalization_factor"), Some(1.0));
    }

    #[test]
    fn test_start_month_from_newest_timestamp() {
        let mut w = window(5);
        w[4].timestamp = Some(Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap());
        let fv = derive_features(&w).unwrap();
        assert_eq!(fv.get("start_month"), Some(3.0));
    }

    #[test]
    fn test_constant_window_zero_spread() {
        let w = vec![Reading::new([1.0, 200.0, 120.0, 100.0, 100.0, 3.5, 15.0]); 6];
        let fv = derive_features(&w).unwrap();
        assert_eq!(fv.get("main_CompForce_sd"), Some(0.0));
        assert_eq!(fv.get("tbl_speed_change"), Some(0.0));
    }

    #[test]
    fn test_project_zero_fills_unknown_names() {
        let fv = derive_features(&window(5)).unwrap();
        let projected = fv.project(&["api_content", "unheard_of", "code"]);
        assert_eq!(projected, vec![94.4, 0.0, 25.0]);
    }
}
