//! Inference: policy invocation, confidence calibration and the request
//! orchestrator that ties buffers, backfill and models together.

pub mod calibration;
pub mod invoke;
mod orchestrator;

pub use invoke::{invoke_policy, Invocation};
pub use orchestrator::{PredictionError, PredictionService, ServiceSettings};
