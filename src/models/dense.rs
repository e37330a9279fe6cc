//! Feed-forward network checkpoints
//!
//! A JSON checkpoint holds fully-connected layers, each with a
//! `[out][in]` weight matrix, a bias vector and an activation:
//!
//! ```json
//! {
//!   "feature_names": ["tbl_speed_mean", ...],
//!   "layers": [
//!     {"weights": [[...], ...], "bias": [...], "activation": "relu"},
//!     {"weights": [[...], ...], "bias": [...], "activation": "softmax"}
//!   ]
//! }
//! ```
//!
//! The same network type serves as forecaster (flattened sequence in,
//! flattened horizon out), classifier and policy.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::loader::ModelLoadError;
use super::{Classifier, InvokeError, PolicyModel, SequenceModel};
use crate::features;
use crate::types::CHANNEL_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Softmax,
    #[default]
    Identity,
}

impl Activation {
    fn apply(self, values: &mut [f64]) {
        match self {
            Self::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Self::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Self::Sigmoid => values.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
            Self::Softmax => {
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mut sum = 0.0;
                for v in values.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                if sum > 0.0 {
                    values.iter_mut().for_each(|v| *v /= sum);
                }
            }
            Self::Identity => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> = self
            .weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| row.iter().zip(input.iter()).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        self.activation.apply(&mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    /// Input column names; classifiers only
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let bytes = std::fs::read(path).map_err(|e| ModelLoadError::Io(path.to_path_buf(), e))?;
        let network: Self =
            serde_json::from_slice(&bytes).map_err(|e| ModelLoadError::Parse(path.to_path_buf(), e))?;
        network
            .validate()
            .map_err(|reason| ModelLoadError::Invalid(path.to_path_buf(), reason))?;
        Ok(network)
    }

    /// Check that consecutive layer shapes line up.
    pub fn validate(&self) -> Result<(), String> {
        let Some(first) = self.layers.first() else {
            return Err("network has no layers".to_string());
        };
        let mut width = first.inputs();
        if width == 0 {
            return Err("first layer has no inputs".to_string());
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.bias.len() != layer.outputs() {
                return Err(format!(
                    "layer {i}: {} weight rows but {} biases",
                    layer.outputs(),
                    layer.bias.len()
                ));
            }
            if let Some(row) = layer.weights.iter().position(|r| r.len() != width) {
                return Err(format!("layer {i}: weight row {row} does not have {width} inputs"));
            }
            width = layer.outputs();
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.input_dim() {
            return Err(format!(
                "{} feature names for {} inputs",
                self.feature_names.len(),
                self.input_dim()
            ));
        }
        Ok(())
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::inputs)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::outputs)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>, InvokeError> {
        if input.len() != self.input_dim() {
            return Err(InvokeError::Shape {
                expected: self.input_dim(),
                got: input.len(),
            });
        }
        let output = self
            .layers
            .iter()
            .fold(input.to_vec(), |x, layer| layer.forward(&x));
        if output.iter().all(|v| v.is_finite()) {
            Ok(output)
        } else {
            Err(InvokeError::Failed("network produced non-finite output".to_string()))
        }
    }
}

impl SequenceModel for DenseNetwork {
    fn forecast(&self, sequence: &[[f64; CHANNEL_COUNT]]) -> Result<Vec<Vec<f64>>, InvokeError> {
        let flat: Vec<f64> = sequence.iter().flatten().copied().collect();
        let out = self.forward(&flat)?;
        if out.is_empty() || out.len() % CHANNEL_COUNT != 0 {
            return Err(InvokeError::Failed(format!(
                "forecast output of {} values is not a whole number of {CHANNEL_COUNT}-channel rows",
                out.len()
            )));
        }
        Ok(out.chunks(CHANNEL_COUNT).map(<[f64]>::to_vec).collect())
    }
}

impl Classifier for DenseNetwork {
    fn feature_names(&self) -> Vec<String> {
        if self.feature_names.is_empty() {
            features::feature_names().map(str::to_string).collect()
        } else {
            self.feature_names.clone()
        }
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, InvokeError> {
        self.forward(features)
    }
}

impl PolicyModel for DenseNetwork {
    fn predict_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InvokeError> {
        states.iter().map(|s| self.forward(s)).collect()
    }

    fn predict_array(&self, state: &[f32]) -> Result<Vec<f32>, InvokeError> {
        let input: Vec<f64> = state.iter().map(|v| f64::from(*v)).collect();
        #[allow(clippy::cast_possible_truncation)]
        let out = self.forward(&input)?.iter().map(|v| *v as f32).collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(weights: Vec<Vec<f64>>, bias: Vec<f64>, activation: Activation) -> DenseLayer {
        DenseLayer { weights, bias, activation }
    }

    #[test]
    fn test_forward_relu_then_identity() {
        let net = DenseNetwork {
            feature_names: Vec::new(),
            layers: vec![
                layer(vec![vec![1.0, -1.0], vec![-1.0, 1.0]], vec![0.0, 0.0], Activation::Relu),
                layer(vec![vec![2.0, 3.0]], vec![1.0], Activation::Identity),
            ],
        };
        assert!(net.validate().is_ok());
        // relu([1, -1]) = [1, 0] → 2 + 0 + 1
        assert_eq!(net.forward(&[2.0, 1.0]).unwrap(), vec![3.0]);
        assert!(matches!(net.forward(&[1.0]), Err(InvokeError::Shape { expected: 2, got: 1 })));
    }

    #[test]
    fn test_softmax_output_sums_to_one() {
        let net = DenseNetwork {
            feature_names: Vec::new(),
            layers: vec![layer(
                vec![vec![1.0], vec![2.0], vec![3.0]],
                vec![0.0; 3],
                Activation::Softmax,
            )],
        };
        let probs = net.predict_proba(&[1.0]).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_validate_rejects_mismatched_layers() {
        let net = DenseNetwork {
            feature_names: Vec::new(),
            layers: vec![
                layer(vec![vec![1.0, 1.0]], vec![0.0], Activation::Relu),
                layer(vec![vec![1.0, 1.0]], vec![0.0], Activation::Identity),
            ],
        };
        assert!(net.validate().unwrap_err().contains("layer 1"));
    }

    #[test]
    fn test_forecast_reshapes_rows() {
        // 2-step sequence in, one 7-channel row out (sums each channel)
        let weights: Vec<Vec<f64>> = (0..CHANNEL_COUNT)
            .map(|c| {
                (0..2 * CHANNEL_COUNT)
                    .map(|i| if i % CHANNEL_COUNT == c { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        let net = DenseNetwork {
            feature_names: Vec::new(),
            layers: vec![layer(weights, vec![0.0; CHANNEL_COUNT], Activation::Identity)],
        };
        let rows = net.forecast(&[[1.0; CHANNEL_COUNT], [2.0; CHANNEL_COUNT]]).unwrap();
        assert_eq!(rows, vec![vec![3.0; CHANNEL_COUNT]]);
    }

    #[test]
    fn test_classifier_defaults_to_schema_names() {
        let net = DenseNetwork {
            feature_names: Vec::new(),
            layers: vec![layer(vec![vec![0.0; features::FEATURE_COUNT]], vec![0.0], Activation::Identity)],
        };
        assert_eq!(net.feature_names().len(), features::FEATURE_COUNT);
        assert_eq!(net.feature_names()[8], "main_CompForce mean");
    }

    #[test]
    fn test_checkpoint_from_json() {
        let net: DenseNetwork = serde_json::from_str(
            r#"{"layers": [{"weights": [[0.5, 0.5, 0.5]], "bias": [0.0]}]}"#,
        )
        .unwrap();
        assert_eq!(net.layers[0].activation, Activation::Identity);
        assert_eq!(net.predict_batch(&[vec![2.0, 2.0, 2.0]]).unwrap(), vec![vec![3.0]]);
        assert_eq!(net.predict_array(&[2.0, 2.0, 2.0]).unwrap(), vec![3.0_f32]);
    }
}
