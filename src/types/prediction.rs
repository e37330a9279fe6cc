//! Prediction result types returned by the inference service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Reading;

/// Which buffer supplied the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Processed buffer (downtime-filtered, smoothed on ingestion)
    Processed,
    /// Raw buffer, preprocessed on demand
    Raw,
}

impl DataSource {
    pub const fn is_processed(self) -> bool {
        matches!(self, Self::Processed)
    }
}

/// Defect risk bucket derived from the defect probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// `> 0.7` is high, `> 0.3` is medium, anything else low.
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.7 {
            Self::High
        } else if probability > 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Tablet quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityClass {
    High,
    Low,
    Medium,
}

impl QualityClass {
    /// Classifier output order (label-encoded alphabetically at training time).
    pub const ALL: [Self; 3] = [Self::High, Self::Low, Self::Medium];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for QualityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
        }
    }
}

/// Recommended control adjustments, always exactly three components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionVector {
    pub speed_adjustment: f64,
    pub compression_adjustment: f64,
    pub fill_adjustment: f64,
}

impl ActionVector {
    /// Number of named action components.
    pub const LEN: usize = 3;

    /// All-zero action substituted when no policy output is available.
    pub const fn neutral() -> Self {
        Self {
            speed_adjustment: 0.0,
            compression_adjustment: 0.0,
            fill_adjustment: 0.0,
        }
    }

    /// Normalize a raw model output: missing components are zero, extra
    /// components are dropped.
    pub fn from_slice(raw: &[f64]) -> Self {
        let at = |i: usize| raw.get(i).copied().unwrap_or(0.0);
        Self {
            speed_adjustment: at(0),
            compression_adjustment: at(1),
            fill_adjustment: at(2),
        }
    }

    pub const fn to_array(self) -> [f64; Self::LEN] {
        [
            self.speed_adjustment,
            self.compression_adjustment,
            self.fill_adjustment,
        ]
    }
}

/// Short-horizon forecast, one reading per forecast timestep.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub horizon: Vec<Reading>,
    pub source: DataSource,
}

/// Defect classifier output with calibrated confidence.
#[derive(Debug, Clone, Serialize)]
pub struct DefectResult {
    /// Probability of the defect class
    pub probability: f64,
    /// Calibrated confidence, always within the configured floor/ceiling
    pub confidence: f64,
    /// Largest class probability before calibration
    pub raw_confidence: f64,
    pub risk_level: RiskLevel,
    pub source: DataSource,
}

/// Quality classifier output with calibrated confidence.
#[derive(Debug, Clone, Serialize)]
pub struct QualityResult {
    pub class: QualityClass,
    pub confidence: f64,
    /// Probability of the predicted class before calibration
    pub raw_confidence: f64,
    pub class_probabilities: BTreeMap<QualityClass, f64>,
    pub source: DataSource,
}

/// Policy recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Registered policy name
    pub model: String,
    pub action: ActionVector,
    /// State vector the policy was queried with (mean of buffered readings)
    pub state_summary: Reading,
    /// True when every invocation strategy failed and the neutral action
    /// was substituted
    pub degraded: bool,
    pub is_mock: bool,
    /// Invocation strategy that produced the action
    pub strategy: Option<&'static str>,
    pub source: DataSource,
}

/// Tagged union over every prediction kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionResult {
    Forecast(Forecast),
    Defect(DefectResult),
    Quality(QualityResult),
    Action(ActionResult),
}

impl From<Forecast> for PredictionResult {
    fn from(r: Forecast) -> Self {
        Self::Forecast(r)
    }
}

impl From<DefectResult> for PredictionResult {
    fn from(r: DefectResult) -> Self {
        Self::Defect(r)
    }
}

impl From<QualityResult> for PredictionResult {
    fn from(r: QualityResult) -> Self {
        Self::Quality(r)
    }
}

impl From<ActionResult> for PredictionResult {
    fn from(r: ActionResult) -> Self {
        Self::Action(r)
    }
}

/// Whether the buffers hold enough history for each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub forecast_ready: bool,
    pub classification_ready: bool,
    pub policy_ready: bool,
}

/// Snapshot of buffer fill levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStatus {
    pub raw_size: usize,
    pub processed_size: usize,
    pub capacity: usize,
    pub readiness: Readiness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_vector_normalizes_length() {
        for (raw, expected) in [
            (vec![], [0.0, 0.0, 0.0]),
            (vec![0.5], [0.5, 0.0, 0.0]),
            (vec![0.1, -0.2, 0.3], [0.1, -0.2, 0.3]),
            (vec![0.1, -0.2, 0.3, 0.9, 0.8], [0.1, -0.2, 0.3]),
        ] {
            assert_eq!(ActionVector::from_slice(&raw).to_array(), expected);
        }
    }

    #[test]
    fn test_risk_level_buckets() {
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.71), RiskLevel::High);
    }

    #[test]
    fn test_quality_class_order() {
        assert_eq!(QualityClass::from_index(0), Some(QualityClass::High));
        assert_eq!(QualityClass::from_index(2), Some(QualityClass::Medium));
        assert_eq!(QualityClass::from_index(3), None);
    }
}
