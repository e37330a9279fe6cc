//! Confidence calibration for classifier outputs
//!
//! Reported confidence is the raw class probability plus two fixed offsets
//! (outcome bucket and input source), clamped to the configured
//! floor/ceiling. The offsets are line reporting policy, not learned values.

use crate::config::CalibrationConfig;
use crate::types::{DataSource, QualityClass};

fn clamp(config: &CalibrationConfig, value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(config.confidence_floor, config.confidence_ceiling)
    } else {
        config.confidence_floor
    }
}

/// Calibrated confidence of a defect prediction.
///
/// `max_probability` is the largest class probability; `defect_probability`
/// picks the risk bucket.
pub fn defect_confidence(
    config: &CalibrationConfig,
    max_probability: f64,
    defect_probability: f64,
    source: DataSource,
) -> f64 {
    let bucket_boost = if defect_probability < config.defect_low_risk_below {
        config.defect_low_risk_boost
    } else if defect_probability < config.defect_medium_risk_below {
        config.defect_medium_risk_boost
    } else {
        config.defect_high_risk_boost
    };
    let source_boost = if source.is_processed() {
        config.defect_processed_boost
    } else {
        config.defect_raw_boost
    };
    clamp(config, max_probability + bucket_boost + source_boost)
}

/// Calibrated confidence of a quality prediction.
pub fn quality_confidence(
    config: &CalibrationConfig,
    class_probability: f64,
    class: QualityClass,
    source: DataSource,
) -> f64 {
    let class_boost = if class == QualityClass::High {
        config.quality_high_class_boost
    } else {
        config.quality_other_class_boost
    };
    let source_boost = if source.is_processed() {
        config.quality_processed_boost
    } else {
        config.quality_raw_boost
    };
    clamp(config, class_probability + class_boost + source_boost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_confidence_always_in_band() {
        let config = CalibrationConfig::default();
        for p in [0.0, 0.1, 0.5, 0.69, 0.9, 1.0, f64::NAN] {
            for source in [DataSource::Processed, DataSource::Raw] {
                let c = defect_confidence(&config, p, p, source);
                assert!((0.75..=0.95).contains(&c), "p={p} source={source:?} → {c}");
            }
        }
    }

    #[test]
    fn test_quality_confidence_always_in_band() {
        let config = CalibrationConfig::default();
        for p in [0.0, 0.33, 0.8, 1.0] {
            for class in QualityClass::ALL {
                for source in [DataSource::Processed, DataSource::Raw] {
                    let c = quality_confidence(&config, p, class, source);
                    assert!((0.75..=0.95).contains(&c));
                }
            }
        }
    }

    #[test]
    fn test_offsets_applied_inside_band() {
        let config = CalibrationConfig::default();
        // low-risk bucket (+0.10) from raw (+0.03)
        let c = defect_confidence(&config, 0.7, 0.2, DataSource::Raw);
        assert!((c - 0.83).abs() < 1e-12);
        // medium-risk bucket (+0.05) from processed (+0.08)
        let c = defect_confidence(&config, 0.6, 0.4, DataSource::Processed);
        assert!((c - 0.75).abs() < 1e-12, "0.73 is raised to the floor");
        // Medium class (+0.05) from raw (+0.05)
        let c = quality_confidence(&config, 0.7, QualityClass::Medium, DataSource::Raw);
        assert!((c - 0.8).abs() < 1e-12);
    }
}
