//! System-wide default constants.
//!
//! Grouped by subsystem. Every value here is also the default of the
//! matching `line_config.toml` field.

// ============================================================================
// Telemetry Source
// ============================================================================

/// Base URL of the external sensor API.
pub const SOURCE_BASE_URL: &str = "http://127.0.0.1:5000";

/// Per-request timeout for the sensor API (seconds).
pub const SOURCE_TIMEOUT_SECS: u64 = 10;

/// Interval between polls of `/api/current` (seconds).
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Largest `count` accepted by the latest-N passthrough endpoint.
pub const MAX_LATEST_COUNT: usize = 100;

// ============================================================================
// Buffers
// ============================================================================

/// Ring capacity of both the raw and the processed buffer (readings).
///
/// 60 readings at a 10 s poll interval = 10 minutes of history.
pub const BUFFER_CAPACITY: usize = 60;

/// Most-recent raw readings re-run through preprocessing per ingested reading.
pub const INCREMENTAL_WINDOW: usize = 10;

/// Raw readings needed before ingestion starts smoothing.
pub const MIN_POINTS_FOR_SMOOTHING: usize = 3;

// ============================================================================
// Downtime Detection
// ============================================================================

/// Table speed at or below this is treated as a stopped turret.
pub const DOWNTIME_MIN_TBL_SPEED: f64 = 0.1;

/// Produced count at or below this means nothing is being pressed.
pub const DOWNTIME_MIN_PRODUCED: f64 = 0.0;

/// Waste below this is a sensor error.
pub const DOWNTIME_MIN_WASTE: f64 = 0.0;

// ============================================================================
// Forecasting
// ============================================================================

/// Input sequence length of the forecaster (readings).
pub const SEQUENCE_LENGTH: usize = 60;

/// Forecast horizon produced by the forecaster (timesteps).
pub const FORECAST_HORIZON: usize = 30;

// ============================================================================
// History Requirements
// ============================================================================

/// Raw readings required before a forecast is attempted.
pub const MIN_POINTS_FORECAST: usize = 60;

/// Raw readings required before a defect/quality classification.
pub const MIN_POINTS_CLASSIFICATION: usize = 5;

/// Raw readings required before a policy action.
pub const MIN_POINTS_POLICY: usize = 1;

// ============================================================================
// Confidence Calibration
// ============================================================================

/// Lower clamp for calibrated classifier confidence.
pub const CONFIDENCE_FLOOR: f64 = 0.75;

/// Upper clamp for calibrated classifier confidence.
pub const CONFIDENCE_CEILING: f64 = 0.95;

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8000";
