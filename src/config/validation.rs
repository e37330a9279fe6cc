//! Config validation: unknown-key detection with Levenshtein suggestions
//! and suspicious-value checks.
//!
//! The raw TOML is parsed into `toml::Value` first and its key tree is
//! compared against the known field names. Unknown keys only warn; serde
//! deserialization proceeds afterwards as normal.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

/// Tables whose children are user-chosen names rather than fields.
const OPEN_TABLES: &[&str] = &["models.policies"];

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `LineConfig`.
///
/// Kept by hand in step with line_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [source]
        "source",
        "source.base_url",
        "source.timeout_secs",
        "source.poll_interval_secs",
        // [buffer]
        "buffer",
        "buffer.capacity",
        "buffer.incremental_window",
        // [downtime]
        "downtime",
        "downtime.min_tbl_speed",
        "downtime.min_produced",
        "downtime.min_waste",
        // [forecast]
        "forecast",
        "forecast.sequence_length",
        "forecast.horizon",
        // [requirements]
        "requirements",
        "requirements.forecast",
        "requirements.classification",
        "requirements.policy",
        // [calibration]
        "calibration",
        "calibration.confidence_floor",
        "calibration.confidence_ceiling",
        "calibration.defect_low_risk_below",
        "calibration.defect_medium_risk_below",
        "calibration.defect_low_risk_boost",
        "calibration.defect_medium_risk_boost",
        "calibration.defect_high_risk_boost",
        "calibration.defect_processed_boost",
        "calibration.defect_raw_boost",
        "calibration.quality_high_class_boost",
        "calibration.quality_other_class_boost",
        "calibration.quality_processed_boost",
        "calibration.quality_raw_boost",
        // [models]
        "models",
        "models.feature_scaler",
        "models.sequence_input_scaler",
        "models.sequence_target_scaler",
        "models.forecaster",
        "models.defect_classifier",
        "models.quality_classifier",
        "models.policies",
        // [server]
        "server",
        "server.addr",
        "server.cors_origins",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
/// Children of [`OPEN_TABLES`] are not descended into.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() && !OPEN_TABLES.contains(&path.as_str()) {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails; parse errors surface later from serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Values that parse and validate but disagree with the trained models'
/// shape. Startup continues; these are logged.
pub fn suspicious_values(config: &super::LineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if config.buffer.capacity < config.forecast.sequence_length {
        warnings.push(ValidationWarning {
            field: "buffer.capacity".to_string(),
            message: format!(
                "buffer.capacity ({}) is below forecast.sequence_length ({}); forecasts will always be padded",
                config.buffer.capacity, config.forecast.sequence_length
            ),
            suggestion: None,
        });
    }

    if config.requirements.forecast < config.forecast.sequence_length {
        warnings.push(ValidationWarning {
            field: "requirements.forecast".to_string(),
            message: format!(
                "requirements.forecast ({}) is below forecast.sequence_length ({}); short histories will be padded",
                config.requirements.forecast, config.forecast.sequence_length
            ),
            suggestion: None,
        });
    }

    if config.source.timeout_secs > config.source.poll_interval_secs {
        warnings.push(ValidationWarning {
            field: "source.timeout_secs".to_string(),
            message: format!(
                "source.timeout_secs ({}) exceeds source.poll_interval_secs ({}); polls may overlap",
                config.source.timeout_secs, config.source.poll_interval_secs
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("capacity", "capacity"), 0);
        assert_eq!(levenshtein("capasity", "capacity"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [downtime]
            min_tbl_speed = 0.2
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"downtime".to_string()));
        assert!(keys.contains(&"downtime.min_tbl_speed".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[buffer]
capasity = 60
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "buffer.capasity");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("buffer.capacity"));
    }

    #[test]
    fn test_policy_names_are_not_flagged() {
        let warnings = validate_unknown_keys(
            r#"
[models]
forecaster = "forecaster.json"

[models.policies]
baseline = "baseline.json"
experimental_v2 = "v2.json"
"#,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys(
            r#"
[telemetry]
url = "http://localhost"
"#,
        );
        assert!(warnings.iter().any(|w| w.field == "telemetry"));
        assert!(warnings.iter().any(|w| w.field == "telemetry.url"));
    }

    #[test]
    fn test_no_suggestion_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_are_not_suspicious() {
        let config = crate::config::LineConfig::default();
        assert!(suspicious_values(&config).is_empty());
    }

    #[test]
    fn test_small_buffer_is_suspicious() {
        let mut config = crate::config::LineConfig::default();
        config.buffer.capacity = 30;
        config.requirements.forecast = 30;
        let warnings = suspicious_values(&config);
        assert!(warnings.iter().any(|w| w.field == "buffer.capacity"));
        assert!(warnings.iter().any(|w| w.field == "requirements.forecast"));
    }
}
