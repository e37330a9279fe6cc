//! Policy invocation strategy chain
//!
//! Policy checkpoints expose different call conventions. Each convention is
//! one strategy with the same signature; they are tried in fixed order and
//! the first success wins. Exhausting the chain is not an error: the
//! neutral action is substituted and the result flagged as degraded.

use tracing::{debug, warn};

use crate::models::{InvokeError, PolicyModel, Tensor};
use crate::types::ActionVector;

type Strategy = fn(&dyn PolicyModel, &[f64]) -> Result<Vec<f64>, InvokeError>;

fn batch_first_row(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    model
        .predict_batch(&[state.to_vec()])?
        .into_iter()
        .next()
        .ok_or_else(|| InvokeError::Failed("empty batch output".to_string()))
}

fn raw(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    model.predict_raw(state)
}

#[allow(clippy::cast_possible_truncation)]
fn f32_array(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    let input: Vec<f32> = state.iter().map(|v| *v as f32).collect();
    Ok(model
        .predict_array(&input)?
        .into_iter()
        .map(f64::from)
        .collect())
}

fn tensor(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    let out = model.predict_tensor(&Tensor::row(state))?;
    // a leading batch axis of 1 is dropped; anything else is flattened
    Ok(out.data.into_iter().map(f64::from).collect())
}

fn policy_accessor(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    model.policy_action(state)
}

fn sampler(model: &dyn PolicyModel, state: &[f64]) -> Result<Vec<f64>, InvokeError> {
    model.sample_action(state)
}

/// Strategies in priority order.
pub const STRATEGIES: [(&str, Strategy); 6] = [
    ("predict_batch", batch_first_row),
    ("predict_raw", raw),
    ("predict_array", f32_array),
    ("predict_tensor", tensor),
    ("policy_action", policy_accessor),
    ("sample_action", sampler),
];

/// Result of running the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub action: ActionVector,
    /// Strategy that succeeded; `None` when the chain was exhausted
    pub strategy: Option<&'static str>,
}

impl Invocation {
    pub const fn degraded(&self) -> bool {
        self.strategy.is_none()
    }
}

/// Run the strategy chain for one state vector.
///
/// Outputs with non-finite values count as a failed strategy.
pub fn invoke_policy(name: &str, model: &dyn PolicyModel, state: &[f64]) -> Invocation {
    for (strategy, call) in STRATEGIES {
        match call(model, state) {
            Ok(raw) if raw.iter().all(|v| v.is_finite()) => {
                debug!(policy = name, strategy, outputs = raw.len(), "Policy invocation succeeded");
                return Invocation {
                    action: ActionVector::from_slice(&raw),
                    strategy: Some(strategy),
                };
            }
            Ok(_) => {
                warn!(policy = name, strategy, "Policy returned non-finite action, trying next strategy");
            }
            Err(InvokeError::Unsupported(_)) => {
                debug!(policy = name, strategy, "Call convention not supported");
            }
            Err(e) => {
                warn!(policy = name, strategy, error = %e, "Policy invocation failed, trying next strategy");
            }
        }
    }

    warn!(policy = name, "All policy invocation strategies failed, returning neutral action");
    Invocation {
        action: ActionVector::neutral(),
        strategy: None,
    }
}
