//! Prediction Orchestrator
//!
//! Per request: check model availability, backfill if the raw buffer is
//! short, snapshot the buffers, build the model input, invoke, calibrate
//! and package a typed result. Buffer locks are only held for the
//! snapshot copy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::calibration;
use super::invoke::invoke_policy;
use crate::acquisition::TelemetrySource;
use crate::backfill::{BackfillController, BackfillOutcome, HistoryRequirement, InsufficientHistory};
use crate::buffer::TelemetryStore;
use crate::config::{CalibrationConfig, ForecastConfig, LineConfig, RequirementsConfig};
use crate::features::{self, FeatureVector, InsufficientWindow};
use crate::models::{self, ClassifierHandle, ForecasterHandle, ModelKind, ModelRegistry};
use crate::preprocessing::Preprocessor;
use crate::sequence::ForecastSequence;
use crate::types::{
    ActionResult, BufferStatus, DataSource, DefectResult, Forecast, QualityClass, QualityResult,
    Reading, RiskLevel, CHANNEL_COUNT,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    #[error("insufficient data: need {required} readings, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("{0} not available")]
    ModelUnavailable(ModelKind),

    #[error("model '{name}' not found")]
    ModelNotFound { name: String, available: Vec<String> },

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

impl From<InsufficientHistory> for PredictionError {
    fn from(e: InsufficientHistory) -> Self {
        Self::InsufficientData {
            required: e.required,
            available: e.available,
        }
    }
}

impl From<InsufficientWindow> for PredictionError {
    fn from(e: InsufficientWindow) -> Self {
        Self::InsufficientData {
            required: e.required,
            available: e.available,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Settings the service reads per request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub forecast: ForecastConfig,
    pub requirements: RequirementsConfig,
    pub calibration: CalibrationConfig,
    pub source_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&LineConfig::default())
    }
}

impl ServiceSettings {
    pub fn from_config(config: &LineConfig) -> Self {
        Self {
            forecast: config.forecast.clone(),
            requirements: config.requirements.clone(),
            calibration: config.calibration.clone(),
            source_timeout: Duration::from_secs(config.source.timeout_secs),
        }
    }
}

pub struct PredictionService {
    store: Arc<TelemetryStore>,
    registry: Arc<ModelRegistry>,
    backfill: BackfillController,
    preprocessor: Preprocessor,
    settings: ServiceSettings,
}

impl PredictionService {
    pub fn new(
        store: Arc<TelemetryStore>,
        registry: Arc<ModelRegistry>,
        source: Arc<dyn TelemetrySource>,
        preprocessor: Preprocessor,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            backfill: BackfillController::new(source, settings.source_timeout),
            store,
            registry,
            preprocessor,
            settings,
        }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn buffer_status(&self) -> BufferStatus {
        self.store.status(&self.settings.requirements)
    }

    /// Backfill the raw buffer towards full capacity.
    pub async fn supplement_buffer(&self) -> BackfillOutcome {
        self.backfill.fill_to(&self.store, self.store.capacity()).await
    }

    // ------------------------------------------------------------------------
    // Forecast
    // ------------------------------------------------------------------------

    pub async fn get_forecast(&self) -> Result<Forecast, PredictionError> {
        let handle = self
            .registry
            .forecaster()
            .ok_or(PredictionError::ModelUnavailable(ModelKind::Forecaster))?;

        self.backfill
            .ensure(&self.store, HistoryRequirement(self.settings.requirements.forecast))
            .await?;

        let seq_len = self.settings.forecast.sequence_length;
        let (window, source) = self.select_window(seq_len);
        let sequence = ForecastSequence::build(&window, seq_len);
        debug!(window = window.len(), source = ?source, "Built forecast sequence");

        let horizon = run_forecaster(handle, &sequence)?;
        if horizon.len() != self.settings.forecast.horizon {
            warn!(
                expected = self.settings.forecast.horizon,
                got = horizon.len(),
                "Forecaster horizon differs from configuration"
            );
        }
        Ok(Forecast { horizon, source })
    }

    // ------------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------------

    pub async fn get_defect_prediction(&self) -> Result<DefectResult, PredictionError> {
        let handle = self
            .registry
            .defect_classifier()
            .ok_or(PredictionError::ModelUnavailable(ModelKind::DefectClassifier))?;

        let (features, source) = self.classification_input().await?;
        let probs = run_classifier(handle, &features)?;
        if probs.len() < 2 {
            return Err(PredictionError::InferenceFailed(format!(
                "defect classifier returned {} probabilities, need 2",
                probs.len()
            )));
        }

        let probability = probs[1];
        let raw_confidence = probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let confidence =
            calibration::defect_confidence(&self.settings.calibration, raw_confidence, probability, source);

        Ok(DefectResult {
            probability,
            confidence,
            raw_confidence,
            risk_level: RiskLevel::from_probability(probability),
            source,
        })
    }

    pub async fn get_quality_prediction(&self) -> Result<QualityResult, PredictionError> {
        let handle = self
            .registry
            .quality_classifier()
            .ok_or(PredictionError::ModelUnavailable(ModelKind::QualityClassifier))?;

        let (features, source) = self.classification_input().await?;
        let probs = run_classifier(handle, &features)?;
        if probs.len() != QualityClass::ALL.len() {
            return Err(PredictionError::InferenceFailed(format!(
                "quality classifier returned {} probabilities, need {}",
                probs.len(),
                QualityClass::ALL.len()
            )));
        }

        let (best, raw_confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        let class = QualityClass::from_index(best)
            .ok_or_else(|| PredictionError::InferenceFailed(format!("no quality class {best}")))?;
        let class_probabilities: BTreeMap<QualityClass, f64> =
            QualityClass::ALL.into_iter().zip(probs.iter().copied()).collect();

        Ok(QualityResult {
            class,
            confidence: calibration::quality_confidence(&self.settings.calibration, raw_confidence, class, source),
            raw_confidence,
            class_probabilities,
            source,
        })
    }

    async fn classification_input(&self) -> Result<(FeatureVector, DataSource), PredictionError> {
        self.backfill
            .ensure(&self.store, HistoryRequirement(self.settings.requirements.classification))
            .await?;

        let min_window = self.settings.requirements.classification.max(features::MIN_FEATURE_WINDOW);
        let (window, source) = self.select_window(min_window);
        Ok((features::derive_features(&window)?, source))
    }

    // ------------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------------

    pub async fn get_policy_action(&self, name: &str) -> Result<ActionResult, PredictionError> {
        let handle = self
            .registry
            .policy(name)
            .ok_or_else(|| PredictionError::ModelNotFound {
                name: name.to_string(),
                available: self.registry.policy_names(),
            })?;

        self.backfill
            .ensure(&self.store, HistoryRequirement(self.settings.requirements.policy.max(1)))
            .await?;

        let processed = self.store.processed_snapshot();
        let (window, source) = if processed.is_empty() {
            (self.store.raw_snapshot(), DataSource::Raw)
        } else {
            (processed, DataSource::Processed)
        };
        let state = models::state_vector(&window);

        let invocation = invoke_policy(name, handle.model(), &state.values);
        if invocation.degraded() {
            warn!(policy = name, "Returning degraded policy action");
        } else {
            info!(policy = name, strategy = ?invocation.strategy, "Policy action computed");
        }

        Ok(ActionResult {
            model: name.to_string(),
            action: invocation.action,
            state_summary: state,
            degraded: invocation.degraded(),
            is_mock: handle.is_mock(),
            strategy: invocation.strategy,
            source,
        })
    }

    // ------------------------------------------------------------------------
    // Input selection
    // ------------------------------------------------------------------------

    /// Processed buffer when it holds at least `min_processed` readings,
    /// otherwise the raw buffer run through preprocessing.
    fn select_window(&self, min_processed: usize) -> (Vec<Reading>, DataSource) {
        let processed = self.store.processed_snapshot();
        if processed.len() >= min_processed {
            return (processed, DataSource::Processed);
        }
        let raw = self.store.raw_snapshot();
        (self.preprocessor.run(&raw), DataSource::Raw)
    }
}

// ============================================================================
// Model Calls
// ============================================================================

fn run_forecaster(
    handle: &ForecasterHandle,
    sequence: &ForecastSequence,
) -> Result<Vec<Reading>, PredictionError> {
    let inference = |msg: String| PredictionError::InferenceFailed(msg);

    let mut rows = sequence.to_matrix();
    if let Some(scaler) = &handle.input_scaler {
        for row in &mut rows {
            let scaled = scaler.transform(row).map_err(|e| inference(e.to_string()))?;
            *row = to_channels(&scaled).map_err(inference)?;
        }
    }

    let output = handle
        .model
        .forecast(&rows)
        .map_err(|e| inference(e.to_string()))?;

    output
        .iter()
        .map(|row| -> Result<Reading, PredictionError> {
            let row = match &handle.target_scaler {
                Some(scaler) => scaler.inverse_transform(row).map_err(|e| inference(e.to_string()))?,
                None => row.clone(),
            };
            Ok(Reading::new(to_channels(&row).map_err(inference)?))
        })
        .collect()
}

fn to_channels(row: &[f64]) -> Result<[f64; CHANNEL_COUNT], String> {
    row.try_into()
        .map_err(|_| format!("expected {CHANNEL_COUNT} channels per row, got {}", row.len()))
}

fn run_classifier(handle: &ClassifierHandle, features: &FeatureVector) -> Result<Vec<f64>, PredictionError> {
    let mut row = features.project(&handle.feature_names);
    if let Some(scaler) = &handle.scaler {
        row = scaler
            .transform(&row)
            .map_err(|e| PredictionError::InferenceFailed(e.to_string()))?;
    }
    let probs = handle
        .model
        .predict_proba(&row)
        .map_err(|e| PredictionError::InferenceFailed(e.to_string()))?;
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(PredictionError::InferenceFailed(
            "classifier returned non-finite probabilities".to_string(),
        ));
    }
    Ok(probs)
}
