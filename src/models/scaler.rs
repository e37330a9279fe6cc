//! Fitted feature scalers
//!
//! Column-wise affine transforms fitted at training time and exported as
//! JSON:
//!
//! ```json
//! {"kind": "standard", "mean": [..], "scale": [..]}
//! {"kind": "min_max", "min": [..], "scale": [..]}
//! ```
//!
//! `standard` maps `x → (x - mean) / scale`; `min_max` maps
//! `x → x * scale + min`.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    #[error("scaler expects {expected} columns, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("invalid scaler: {0}")]
    Invalid(String),
    #[error("scaler I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scaler parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl FittedScaler {
    pub fn load(path: &Path) -> Result<Self, ScalerError> {
        let bytes = std::fs::read(path)?;
        let scaler: Self = serde_json::from_slice(&bytes)?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// Check column counts agree and every `scale` entry is usable.
    pub fn validate(&self) -> Result<(), ScalerError> {
        let (offset, scale, offset_name) = match self {
            Self::Standard { mean, scale } => (mean, scale, "mean"),
            Self::MinMax { min, scale } => (min, scale, "min"),
        };
        if offset.len() != scale.len() {
            return Err(ScalerError::Invalid(format!(
                "{offset_name} has {} columns but scale has {}",
                offset.len(),
                scale.len()
            )));
        }
        if offset.is_empty() {
            return Err(ScalerError::Invalid("scaler has no columns".to_string()));
        }
        if scale.iter().chain(offset.iter()).any(|v| !v.is_finite()) {
            return Err(ScalerError::Invalid("non-finite scaler parameter".to_string()));
        }
        if scale.iter().any(|s| *s == 0.0) {
            return Err(ScalerError::Invalid("zero scale".to_string()));
        }
        Ok(())
    }

    pub fn columns(&self) -> usize {
        match self {
            Self::Standard { scale, .. } | Self::MinMax { scale, .. } => scale.len(),
        }
    }

    fn check(&self, row: &[f64]) -> Result<(), ScalerError> {
        if row.len() == self.columns() {
            Ok(())
        } else {
            Err(ScalerError::Dimension {
                expected: self.columns(),
                got: row.len(),
            })
        }
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, ScalerError> {
        self.check(row)?;
        Ok(match self {
            Self::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale.iter()))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
            Self::MinMax { min, scale } => row
                .iter()
                .zip(min.iter().zip(scale.iter()))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        })
    }

    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>, ScalerError> {
        self.check(row)?;
        Ok(match self {
            Self::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale.iter()))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
            Self::MinMax { min, scale } => row
                .iter()
                .zip(min.iter().zip(scale.iter()))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
        })
    }
}
