//! API route handlers
//!
//! Handlers are thin: they call the prediction service or the telemetry
//! source and map the outcome onto the response envelope.

use axum::extract::{Path, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::acquisition::{SourceError, TelemetrySource};
use crate::backfill::BackfillOutcome;
use crate::config::defaults::MAX_LATEST_COUNT;
use crate::inference::{PredictionError, PredictionService};
use crate::models::RegistryStatus;
use crate::types::{BufferStatus, PredictionResult};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    /// Sensor API, for the passthrough endpoints
    pub source: Arc<dyn TelemetrySource>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub buffer_size: usize,
    pub processed_buffer_size: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub models: RegistryStatus,
}

#[derive(Debug, Serialize)]
pub struct SupplementResponse {
    pub outcome: BackfillOutcome,
    pub buffer: BufferStatus,
}

#[derive(Debug, Serialize)]
pub struct SourceHealthResponse {
    pub source: String,
    pub healthy: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

fn prediction_error(e: &PredictionError) -> Response {
    match e {
        PredictionError::InsufficientData { required, available } => ApiErrorResponse::insufficient_data(
            e.to_string(),
            serde_json::json!({ "required": required, "available": available }),
        ),
        PredictionError::ModelNotFound { available, .. } => {
            ApiErrorResponse::not_found_with(e.to_string(), serde_json::json!({ "available_models": available }))
        }
        PredictionError::ModelUnavailable(_) => ApiErrorResponse::service_unavailable(e.to_string()),
        PredictionError::InferenceFailed(_) => {
            warn!(error = %e, "Prediction failed");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}

fn source_error(e: &SourceError) -> Response {
    if let SourceError::NotFound(_) = e {
        return ApiErrorResponse::not_found(e.to_string());
    }
    warn!(error = %e, "Sensor API passthrough failed");
    ApiErrorResponse::bad_gateway(e.to_string())
}

fn respond<T: Into<PredictionResult>>(result: Result<T, PredictionError>) -> Response {
    match result {
        Ok(data) => ApiResponse::<PredictionResult>::ok(data.into()),
        Err(e) => prediction_error(&e),
    }
}

// ============================================================================
// Service endpoints
// ============================================================================

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.service.store();
    ApiResponse::ok(HealthResponse {
        status: "healthy",
        buffer_size: store.raw_len(),
        processed_buffer_size: store.processed_len(),
        last_update: store.raw().latest().and_then(|r| r.timestamp),
        models: state.service.registry().status(),
    })
}

/// GET /api/current
pub async fn current(State(state): State<AppState>) -> Response {
    let latest = state.service.store().raw().latest().cloned();
    match latest {
        Some(reading) => ApiResponse::ok(reading),
        None => ApiErrorResponse::not_found("no readings buffered yet"),
    }
}

/// GET /api/forecast
pub async fn forecast(State(state): State<AppState>) -> Response {
    respond(state.service.get_forecast().await)
}

/// GET /api/defect
pub async fn defect(State(state): State<AppState>) -> Response {
    respond(state.service.get_defect_prediction().await)
}

/// GET /api/quality
pub async fn quality(State(state): State<AppState>) -> Response {
    respond(state.service.get_quality_prediction().await)
}

/// GET /api/rl_action/:model
pub async fn rl_action(State(state): State<AppState>, Path(model): Path<String>) -> Response {
    respond(state.service.get_policy_action(&model).await)
}

/// GET /api/buffer-status
pub async fn buffer_status(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.service.buffer_status())
}

/// GET /api/rl-status
pub async fn rl_status(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.service.registry().status())
}

/// POST /api/supplement-buffer
pub async fn supplement_buffer(State(state): State<AppState>) -> Response {
    let outcome = state.service.supplement_buffer().await;
    info!(
        added = outcome.added(),
        buffered = outcome.buffered,
        "Manual buffer supplement"
    );
    ApiResponse::ok(SupplementResponse {
        outcome,
        buffer: state.service.buffer_status(),
    })
}

// ============================================================================
// Sensor API passthrough
// ============================================================================

/// GET /api/sensor-api/health
pub async fn source_health(State(state): State<AppState>) -> Response {
    ApiResponse::ok(SourceHealthResponse {
        source: state.source.source_name().to_string(),
        healthy: state.source.health_check().await,
    })
}

/// GET /api/sensor-api/status
pub async fn source_status(State(state): State<AppState>) -> Response {
    match state.source.fetch_status().await {
        Ok(status) => ApiResponse::ok(status),
        Err(e) => source_error(&e),
    }
}

/// GET /api/sensor-api/sensors
pub async fn source_sensors(State(state): State<AppState>) -> Response {
    match state.source.fetch_sensors().await {
        Ok(sensors) => ApiResponse::ok(sensors),
        Err(e) => source_error(&e),
    }
}

/// GET /api/sensor-api/all
pub async fn source_all(State(state): State<AppState>) -> Response {
    match state.source.fetch_all().await {
        Ok(readings) => ApiResponse::ok(readings),
        Err(e) => source_error(&e),
    }
}

/// GET /api/sensor-api/latest/:count
pub async fn source_latest(State(state): State<AppState>, Path(count): Path<String>) -> Response {
    let count = match count.parse::<usize>() {
        Ok(n) if (1..=MAX_LATEST_COUNT).contains(&n) => n,
        _ => {
            return ApiErrorResponse::bad_request(format!(
                "count must be an integer between 1 and {MAX_LATEST_COUNT}, got '{count}'"
            ))
        }
    };
    match state.source.fetch_latest(count).await {
        Ok(readings) => ApiResponse::ok(readings),
        Err(e) => source_error(&e),
    }
}

/// GET /api/sensor-api/sensor/:name
pub async fn source_sensor(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.source.fetch_sensor(&name).await {
        Ok(value) => ApiResponse::ok(value),
        Err(e) => source_error(&e),
    }
}
