//! Startup artifact loading
//!
//! Every artifact is optional. Load failures are logged and leave the
//! matching capability unavailable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{DenseNetwork, FittedScaler, ModelRegistry, ScalerError};
use crate::config::ModelsConfig;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("cannot read {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("cannot parse {}: {1}", .0.display())]
    Parse(PathBuf, serde_json::Error),
    #[error("invalid checkpoint {}: {1}", .0.display())]
    Invalid(PathBuf, String),
    #[error("invalid scaler {}: {1}", .0.display())]
    Scaler(PathBuf, ScalerError),
}

fn load_scaler(label: &str, path: Option<&Path>) -> Option<FittedScaler> {
    let path = path?;
    match FittedScaler::load(path) {
        Ok(scaler) => {
            info!(scaler = label, path = %path.display(), columns = scaler.columns(), "Loaded scaler");
            Some(scaler)
        }
        Err(e) => {
            let e = ModelLoadError::Scaler(path.to_path_buf(), e);
            warn!(scaler = label, error = %e, "Scaler unavailable, inputs will be passed unscaled");
            None
        }
    }
}

fn load_network(label: &str, path: Option<&Path>) -> Option<Arc<DenseNetwork>> {
    let path = path?;
    match DenseNetwork::load(path) {
        Ok(net) => {
            info!(
                model = label,
                path = %path.display(),
                inputs = net.input_dim(),
                outputs = net.output_dim(),
                "Loaded model"
            );
            Some(Arc::new(net))
        }
        Err(e) => {
            warn!(model = label, error = %e, "Model unavailable");
            None
        }
    }
}

/// Build the registry from configured artifact paths.
pub fn load_registry(config: &ModelsConfig) -> ModelRegistry {
    let mut builder = ModelRegistry::builder();

    if let Some(forecaster) = load_network("forecaster", config.forecaster.as_deref()) {
        builder = builder.forecaster(
            forecaster,
            load_scaler("sequence_input", config.sequence_input_scaler.as_deref()),
            load_scaler("sequence_target", config.sequence_target_scaler.as_deref()),
        );
    }

    let feature_scaler = load_scaler("feature", config.feature_scaler.as_deref());
    if let Some(defect) = load_network("defect_classifier", config.defect_classifier.as_deref()) {
        builder = builder.defect_classifier(defect, feature_scaler.clone());
    }
    if let Some(quality) = load_network("quality_classifier", config.quality_classifier.as_deref()) {
        builder = builder.quality_classifier(quality, feature_scaler);
    }

    for (name, path) in &config.policies {
        if let Some(policy) = load_network(name, Some(path.as_path())) {
            builder = builder.policy(name.clone(), policy);
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_json(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_empty_config_registers_only_mock() {
        let registry = load_registry(&ModelsConfig::default());
        let status = registry.status();
        assert!(!status.forecaster_loaded);
        assert!(!status.defect_classifier_loaded);
        assert_eq!(registry.policy_names(), ["mock"]);
    }

    #[test]
    fn test_loads_policies_and_skips_broken_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_json(
            &dir,
            "baseline.json",
            r#"{"layers": [{"weights": [[0,0,0,0,0,0,0],[0,0,0,0,0,0,0],[0,0,0,0,0,0,0]], "bias": [0.1, 0.2, 0.3], "activation": "tanh"}]}"#,
        );
        let broken = write_json(&dir, "broken.json", "{not json");

        let mut config = ModelsConfig::default();
        config.policies.insert("baseline".to_string(), good);
        config.policies.insert("new".to_string(), broken);
        config.policies.insert("current".to_string(), dir.path().join("missing.json"));
        config.forecaster = Some(dir.path().join("missing_forecaster.json"));

        let registry = load_registry(&config);
        assert_eq!(registry.policy_names(), ["baseline"]);
        assert!(!registry.policy("baseline").unwrap().is_mock());
        assert!(registry.forecaster().is_none());
    }

    #[test]
    fn test_classifiers_share_feature_scaler() {
        let dir = tempfile::tempdir().unwrap();
        let weights = vec![vec![0.0; 29]; 2];
        let net = serde_json::json!({
            "layers": [{"weights": weights, "bias": [0.0, 0.0], "activation": "softmax"}]
        });
        let classifier = write_json(&dir, "defect.json", &net.to_string());
        let scaler = write_json(
            &dir,
            "scaler.json",
            &serde_json::json!({"kind": "standard", "mean": vec![0.0; 29], "scale": vec![1.0; 29]}).to_string(),
        );

        let config = ModelsConfig {
            feature_scaler: Some(scaler),
            defect_classifier: Some(classifier.clone()),
            quality_classifier: Some(classifier),
            ..ModelsConfig::default()
        };
        let registry = load_registry(&config);
        assert!(registry.defect_classifier().unwrap().scaler.is_some());
        assert!(registry.quality_classifier().unwrap().scaler.is_some());
    }
}
