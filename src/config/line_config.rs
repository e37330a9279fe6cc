//! Line Configuration - operator-tunable TOML values for the inference service
//!
//! Every section implements `Default` with the values the models were
//! trained against, so an absent or empty config file changes nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TABLETCAST_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "line_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one tableting line deployment.
///
/// Load with `LineConfig::load()` which searches:
/// 1. `$TABLETCAST_CONFIG` env var
/// 2. `./line_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineConfig {
    /// External sensor API
    #[serde(default)]
    pub source: SourceConfig,

    /// Raw/processed buffer sizing
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Downtime exclusion thresholds
    #[serde(default)]
    pub downtime: DowntimeConfig,

    /// Forecaster input/output shape
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Minimum history per operation
    #[serde(default)]
    pub requirements: RequirementsConfig,

    /// Classifier confidence calibration offsets
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Model artifact locations
    #[serde(default)]
    pub models: ModelsConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl LineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TABLETCAST_CONFIG` environment variable
    /// 2. `./line_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded line config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded line config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let mut config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.models.resolve_relative_to(path.parent());
        config.validate()?;
        for w in super::validation::suspicious_values(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check cross-field invariants, collecting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.buffer.capacity == 0 {
            errors.push("buffer.capacity must be at least 1".to_string());
        }
        if self.buffer.incremental_window < defaults::MIN_POINTS_FOR_SMOOTHING {
            errors.push(format!(
                "buffer.incremental_window ({}) must be at least {}",
                self.buffer.incremental_window,
                defaults::MIN_POINTS_FOR_SMOOTHING
            ));
        }
        if self.forecast.sequence_length == 0 {
            errors.push("forecast.sequence_length must be at least 1".to_string());
        }
        if self.forecast.horizon == 0 {
            errors.push("forecast.horizon must be at least 1".to_string());
        }

        let r = &self.requirements;
        for (name, value) in [
            ("forecast", r.forecast),
            ("classification", r.classification),
            ("policy", r.policy),
        ] {
            if value > self.buffer.capacity {
                errors.push(format!(
                    "requirements.{name} ({value}) exceeds buffer.capacity ({})",
                    self.buffer.capacity
                ));
            }
        }
        if r.classification < crate::features::MIN_FEATURE_WINDOW {
            errors.push(format!(
                "requirements.classification ({}) must be at least {}",
                r.classification,
                crate::features::MIN_FEATURE_WINDOW
            ));
        }
        if r.policy == 0 {
            errors.push("requirements.policy must be at least 1".to_string());
        }

        let c = &self.calibration;
        if !(0.0..=1.0).contains(&c.confidence_floor) || !(0.0..=1.0).contains(&c.confidence_ceiling) {
            errors.push("calibration confidence bounds must lie within [0, 1]".to_string());
        }
        if c.confidence_floor > c.confidence_ceiling {
            errors.push(format!(
                "calibration.confidence_floor ({:.2}) must not exceed confidence_ceiling ({:.2})",
                c.confidence_floor, c.confidence_ceiling
            ));
        }
        if c.defect_low_risk_below >= c.defect_medium_risk_below {
            errors.push(format!(
                "calibration.defect_low_risk_below ({:.2}) must be less than defect_medium_risk_below ({:.2})",
                c.defect_low_risk_below, c.defect_medium_risk_below
            ));
        }

        if self.source.timeout_secs == 0 {
            errors.push("source.timeout_secs must be at least 1".to_string());
        }
        if self.source.poll_interval_secs == 0 {
            errors.push("source.poll_interval_secs must be at least 1".to_string());
        }
        if self.source.base_url.trim().is_empty() {
            errors.push("source.base_url must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Source
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Sensor API base URL.
    ///
    /// Can be overridden by `TABLETCAST_SOURCE_URL` or `--source-url`.
    pub base_url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Poll interval for the current reading (seconds)
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::SOURCE_BASE_URL.to_string(),
            timeout_secs: defaults::SOURCE_TIMEOUT_SECS,
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
        }
    }
}

// ============================================================================
// Buffer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Ring capacity of each buffer
    pub capacity: usize,
    /// Raw readings re-preprocessed per ingested reading
    pub incremental_window: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::BUFFER_CAPACITY,
            incremental_window: defaults::INCREMENTAL_WINDOW,
        }
    }
}

// ============================================================================
// Downtime
// ============================================================================

/// A reading is downtime when `tbl_speed <= min_tbl_speed`,
/// `produced <= min_produced` or `waste < min_waste`.
///
/// These come from a specific training run, not from physics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowntimeConfig {
    pub min_tbl_speed: f64,
    pub min_produced: f64,
    pub min_waste: f64,
}

impl Default for DowntimeConfig {
    fn default() -> Self {
        Self {
            min_tbl_speed: defaults::DOWNTIME_MIN_TBL_SPEED,
            min_produced: defaults::DOWNTIME_MIN_PRODUCED,
            min_waste: defaults::DOWNTIME_MIN_WASTE,
        }
    }
}

// ============================================================================
// Forecast
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Readings fed to the forecaster
    pub sequence_length: usize,
    /// Timesteps the forecaster is expected to emit
    pub horizon: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            sequence_length: defaults::SEQUENCE_LENGTH,
            horizon: defaults::FORECAST_HORIZON,
        }
    }
}

// ============================================================================
// Requirements
// ============================================================================

/// Raw-buffer history each operation needs before it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementsConfig {
    pub forecast: usize,
    pub classification: usize,
    pub policy: usize,
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            forecast: defaults::MIN_POINTS_FORECAST,
            classification: defaults::MIN_POINTS_CLASSIFICATION,
            policy: defaults::MIN_POINTS_POLICY,
        }
    }
}

// ============================================================================
// Calibration
// ============================================================================

/// Fixed confidence offsets applied on top of classifier probabilities.
///
/// These are reporting policy for the line, not learned values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,

    /// Defect probability below this is the low-risk bucket
    pub defect_low_risk_below: f64,
    /// Defect probability below this (and not low) is the medium-risk bucket
    pub defect_medium_risk_below: f64,
    pub defect_low_risk_boost: f64,
    pub defect_medium_risk_boost: f64,
    pub defect_high_risk_boost: f64,
    pub defect_processed_boost: f64,
    pub defect_raw_boost: f64,

    pub quality_high_class_boost: f64,
    pub quality_other_class_boost: f64,
    pub quality_processed_boost: f64,
    pub quality_raw_boost: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            confidence_floor: defaults::CONFIDENCE_FLOOR,
            confidence_ceiling: defaults::CONFIDENCE_CEILING,
            defect_low_risk_below: 0.3,
            defect_medium_risk_below: 0.7,
            defect_low_risk_boost: 0.10,
            defect_medium_risk_boost: 0.05,
            defect_high_risk_boost: 0.02,
            defect_processed_boost: 0.08,
            defect_raw_boost: 0.03,
            quality_high_class_boost: 0.10,
            quality_other_class_boost: 0.05,
            quality_processed_boost: 0.15,
            quality_raw_boost: 0.05,
        }
    }
}

// ============================================================================
// Models
// ============================================================================

/// Artifact locations. Relative paths resolve against the config file's
/// directory. Any missing artifact leaves the matching capability
/// unavailable rather than failing startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Scaler applied to classifier feature vectors
    pub feature_scaler: Option<PathBuf>,
    /// Scaler applied to forecaster input sequences
    pub sequence_input_scaler: Option<PathBuf>,
    /// Scaler inverted on forecaster outputs
    pub sequence_target_scaler: Option<PathBuf>,
    pub forecaster: Option<PathBuf>,
    pub defect_classifier: Option<PathBuf>,
    pub quality_classifier: Option<PathBuf>,
    /// Named policy checkpoints, e.g. `baseline = "models/baseline.json"`
    pub policies: BTreeMap<String, PathBuf>,
}

impl ModelsConfig {
    fn resolve_relative_to(&mut self, base: Option<&Path>) {
        let Some(base) = base else { return };
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for p in [
            &mut self.feature_scaler,
            &mut self.sequence_input_scaler,
            &mut self.sequence_target_scaler,
            &mut self.forecaster,
            &mut self.defect_classifier,
            &mut self.quality_classifier,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
        self.policies.values_mut().for_each(resolve);
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `TABLETCAST_SERVER_ADDR` env var or `--addr` CLI flag.
    pub addr: String,
    /// Cross-origin dashboard origins; empty means same-origin only
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = LineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.capacity, 60);
        assert_eq!(config.forecast.sequence_length, 60);
        assert_eq!(config.requirements.classification, 5);
    }

    #[test]
    fn test_empty_toml_equals_defaults() {
        let config: LineConfig = toml::from_str("").unwrap();
        assert_eq!(config.downtime, DowntimeConfig::default());
        assert_eq!(config.server.addr, defaults::SERVER_ADDR);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: LineConfig = toml::from_str(
            r#"
            [downtime]
            min_tbl_speed = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.downtime.min_tbl_speed, 5.0);
        assert_eq!(config.downtime.min_produced, 0.0);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = LineConfig::default();
        config.requirements.forecast = 120;
        config.calibration.confidence_floor = 0.99;
        config.source.poll_interval_secs = 0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3, "{errors:?}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = LineConfig::default();
        config
            .models
            .policies
            .insert("baseline".to_string(), PathBuf::from("/models/baseline.json"));
        let text = config.to_toml().unwrap();
        let parsed: LineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.models.policies.len(), 1);
    }
}
