//! Tabletcast: tableting line telemetry inference
//!
//! ## Architecture
//!
//! - **Acquisition**: client for the line's sensor API
//! - **Pipeline**: periodic polling into bounded raw/processed buffers
//! - **Preprocessing**: gap fill, downtime exclusion, causal smoothing
//! - **Features / Sequence**: classifier feature vectors and forecaster input
//! - **Models**: artifact loading and the model registry
//! - **Inference**: backfill-aware prediction orchestration, calibration and
//!   policy invocation
//! - **API**: HTTP transport over the prediction service

pub mod acquisition;
pub mod api;
pub mod backfill;
pub mod buffer;
pub mod config;
pub mod features;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod sequence;
pub mod types;

pub use config::LineConfig;
pub use inference::{PredictionError, PredictionService};
pub use types::{
    ActionResult, BufferStatus, Channel, DataSource, DefectResult, Forecast, QualityClass,
    QualityResult, Reading, RiskLevel,
};
