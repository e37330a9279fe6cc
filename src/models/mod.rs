//! Model registry
//!
//! Trained models are loaded once at startup and handed to the prediction
//! service as immutable handles. Three trait seams cover the model roles:
//!
//! - [`SequenceModel`]: scaled 60×7 sequence in, horizon×7 rows out
//! - [`Classifier`]: scaled feature row in, class probabilities out
//! - [`PolicyModel`]: state vector in, raw action out, through one of six
//!   optional call conventions
//!
//! A missing artifact leaves its capability unavailable; it never fails
//! startup. When no trained policy loads, the deterministic [`MockPolicy`]
//! is registered under `"mock"`.

pub mod dense;
pub mod loader;
pub mod scaler;

pub use dense::DenseNetwork;
pub use loader::load_registry;
pub use scaler::{FittedScaler, ScalerError};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::features;
use crate::types::{Channel, Reading, CHANNEL_COUNT};

/// Name the mock policy is registered under.
pub const MOCK_POLICY_NAME: &str = "mock";

// ============================================================================
// Errors
// ============================================================================

/// Model roles, used for availability reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Forecaster,
    DefectClassifier,
    QualityClassifier,
    Policy,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forecaster => write!(f, "forecaster"),
            Self::DefectClassifier => write!(f, "defect classifier"),
            Self::QualityClassifier => write!(f, "quality classifier"),
            Self::Policy => write!(f, "policy"),
        }
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("call convention '{0}' not supported")]
    Unsupported(&'static str),
    #[error("expected {expected} values, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("model call failed: {0}")]
    Failed(String),
}

// ============================================================================
// Model Traits
// ============================================================================

pub trait SequenceModel: Send + Sync {
    /// Forecast scaled channel rows from a scaled input sequence.
    fn forecast(&self, sequence: &[[f64; CHANNEL_COUNT]]) -> Result<Vec<Vec<f64>>, InvokeError>;
}

pub trait Classifier: Send + Sync {
    /// Feature columns in the order the model was trained on.
    fn feature_names(&self) -> Vec<String>;

    /// Class probabilities for one scaled feature row.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, InvokeError>;
}

/// Dense `f32` tensor for models that only accept tensor input.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// `[1, n]` batch of one state row.
    #[allow(clippy::cast_possible_truncation)]
    pub fn row(state: &[f64]) -> Self {
        Self {
            shape: vec![1, state.len()],
            data: state.iter().map(|v| *v as f32).collect(),
        }
    }
}

/// Policy call conventions. A model implements whichever it supports; the
/// rest report [`InvokeError::Unsupported`].
pub trait PolicyModel: Send + Sync {
    /// Batched predict; the first row is the action.
    fn predict_batch(&self, _states: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InvokeError> {
        Err(InvokeError::Unsupported("predict_batch"))
    }

    /// Predict returning the action directly.
    fn predict_raw(&self, _state: &[f64]) -> Result<Vec<f64>, InvokeError> {
        Err(InvokeError::Unsupported("predict_raw"))
    }

    /// Predict over an explicitly single-precision array.
    fn predict_array(&self, _state: &[f32]) -> Result<Vec<f32>, InvokeError> {
        Err(InvokeError::Unsupported("predict_array"))
    }

    fn predict_tensor(&self, _state: &Tensor) -> Result<Tensor, InvokeError> {
        Err(InvokeError::Unsupported("predict_tensor"))
    }

    /// Policy-specific accessor.
    fn policy_action(&self, _state: &[f64]) -> Result<Vec<f64>, InvokeError> {
        Err(InvokeError::Unsupported("policy_action"))
    }

    /// Sample from the policy's action distribution.
    fn sample_action(&self, _state: &[f64]) -> Result<Vec<f64>, InvokeError> {
        Err(InvokeError::Unsupported("sample_action"))
    }
}

// ============================================================================
// Mock Policy
// ============================================================================

/// Deterministic stand-in policy.
///
/// Recommends nudging each controlled channel back towards its schema
/// default, proportional to the relative deviation and clamped to ±1.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPolicy;

impl MockPolicy {
    const CONTROLLED: [Channel; 3] = [Channel::TblSpeed, Channel::MainComp, Channel::Stiffness];
    const GAIN: f64 = 0.5;

    pub fn action_for(state: &[f64]) -> Vec<f64> {
        Self::CONTROLLED
            .iter()
            .map(|c| {
                let target = c.default_value();
                let value = state.get(c.index()).copied().unwrap_or(target);
                if target == 0.0 || !value.is_finite() {
                    0.0
                } else {
                    (-(value - target) / target * Self::GAIN).clamp(-1.0, 1.0)
                }
            })
            .collect()
    }
}

impl PolicyModel for MockPolicy {
    fn predict_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InvokeError> {
        Ok(states.iter().map(|s| Self::action_for(s)).collect())
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Forecaster plus the scalers it was trained behind.
#[derive(Clone)]
pub struct ForecasterHandle {
    pub model: Arc<dyn SequenceModel>,
    /// Applied to every input row
    pub input_scaler: Option<FittedScaler>,
    /// Inverted on every output row
    pub target_scaler: Option<FittedScaler>,
}

/// Classifier plus its feature scaler and column order.
#[derive(Clone)]
pub struct ClassifierHandle {
    pub model: Arc<dyn Classifier>,
    pub scaler: Option<FittedScaler>,
    pub feature_names: Vec<String>,
}

impl ClassifierHandle {
    /// Wrap a classifier, warning about feature names the schema cannot
    /// supply (they are zero-filled at inference).
    pub fn new(kind: ModelKind, model: Arc<dyn Classifier>, scaler: Option<FittedScaler>) -> Self {
        let feature_names = model.feature_names();
        let unknown: Vec<&str> = feature_names
            .iter()
            .map(String::as_str)
            .filter(|n| features::feature_index(n).is_none())
            .collect();
        if !unknown.is_empty() {
            warn!(model = %kind, unknown = ?unknown, "Classifier expects features outside the schema, zero-filling");
        }
        if let Some(s) = &scaler {
            if s.columns() != feature_names.len() {
                warn!(
                    model = %kind,
                    scaler_columns = s.columns(),
                    features = feature_names.len(),
                    "Feature scaler width does not match classifier inputs"
                );
            }
        }
        Self {
            model,
            scaler,
            feature_names,
        }
    }
}

/// A registered policy: a trained model or the mock.
#[derive(Clone)]
pub enum PolicyHandle {
    Trained(Arc<dyn PolicyModel>),
    Mock(MockPolicy),
}

impl PolicyHandle {
    pub fn model(&self) -> &dyn PolicyModel {
        match self {
            Self::Trained(model) => model.as_ref(),
            Self::Mock(mock) => mock,
        }
    }

    pub const fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PolicyStatus {
    pub name: String,
    pub is_mock: bool,
}

/// Which capabilities loaded.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub forecaster_loaded: bool,
    pub defect_classifier_loaded: bool,
    pub quality_classifier_loaded: bool,
    pub policies: Vec<PolicyStatus>,
    pub trained_policy_count: usize,
}

#[derive(Clone, Default)]
pub struct ModelRegistry {
    forecaster: Option<ForecasterHandle>,
    defect: Option<ClassifierHandle>,
    quality: Option<ClassifierHandle>,
    policies: BTreeMap<String, PolicyHandle>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub const fn forecaster(&self) -> Option<&ForecasterHandle> {
        self.forecaster.as_ref()
    }

    pub const fn defect_classifier(&self) -> Option<&ClassifierHandle> {
        self.defect.as_ref()
    }

    pub const fn quality_classifier(&self) -> Option<&ClassifierHandle> {
        self.quality.as_ref()
    }

    pub fn policy(&self, name: &str) -> Option<&PolicyHandle> {
        self.policies.get(name)
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    pub fn status(&self) -> RegistryStatus {
        let policies: Vec<PolicyStatus> = self
            .policies
            .iter()
            .map(|(name, handle)| PolicyStatus {
                name: name.clone(),
                is_mock: handle.is_mock(),
            })
            .collect();
        RegistryStatus {
            forecaster_loaded: self.forecaster.is_some(),
            defect_classifier_loaded: self.defect.is_some(),
            quality_classifier_loaded: self.quality.is_some(),
            trained_policy_count: policies.iter().filter(|p| !p.is_mock).count(),
            policies,
        }
    }
}

#[derive(Default)]
pub struct ModelRegistryBuilder {
    registry: ModelRegistry,
}

impl ModelRegistryBuilder {
    #[must_use]
    pub fn forecaster(
        mut self,
        model: Arc<dyn SequenceModel>,
        input_scaler: Option<FittedScaler>,
        target_scaler: Option<FittedScaler>,
    ) -> Self {
        self.registry.forecaster = Some(ForecasterHandle {
            model,
            input_scaler,
            target_scaler,
        });
        self
    }

    #[must_use]
    pub fn defect_classifier(mut self, model: Arc<dyn Classifier>, scaler: Option<FittedScaler>) -> Self {
        self.registry.defect = Some(ClassifierHandle::new(ModelKind::DefectClassifier, model, scaler));
        self
    }

    #[must_use]
    pub fn quality_classifier(mut self, model: Arc<dyn Classifier>, scaler: Option<FittedScaler>) -> Self {
        self.registry.quality = Some(ClassifierHandle::new(ModelKind::QualityClassifier, model, scaler));
        self
    }

    #[must_use]
    pub fn policy(mut self, name: impl Into<String>, model: Arc<dyn PolicyModel>) -> Self {
        self.registry
            .policies
            .insert(name.into(), PolicyHandle::Trained(model));
        self
    }

    /// Finish the registry, registering the mock policy when no trained
    /// policy was added.
    pub fn build(mut self) -> ModelRegistry {
        if self.registry.policies.is_empty() {
            warn!("No trained policies loaded, registering '{}' policy", MOCK_POLICY_NAME);
            self.registry
                .policies
                .insert(MOCK_POLICY_NAME.to_string(), PolicyHandle::Mock(MockPolicy));
        }
        let status = self.registry.status();
        info!(
            forecaster = status.forecaster_loaded,
            defect = status.defect_classifier_loaded,
            quality = status.quality_classifier_loaded,
            policies = ?self.registry.policy_names(),
            "Model registry ready"
        );
        self.registry
    }
}

/// Mean of a window as a policy state vector; schema defaults for an empty
/// window.
pub fn state_vector(window: &[Reading]) -> Reading {
    Reading::mean_of(window).unwrap_or_else(Reading::defaults)
}
