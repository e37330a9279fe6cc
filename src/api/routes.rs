//! API route table, nested under `/api`.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, AppState};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/current", get(handlers::current))
        // Predictions
        .route("/forecast", get(handlers::forecast))
        .route("/defect", get(handlers::defect))
        .route("/quality", get(handlers::quality))
        .route("/rl_action/:model", get(handlers::rl_action))
        // Buffers and models
        .route("/buffer-status", get(handlers::buffer_status))
        .route("/rl-status", get(handlers::rl_status))
        .route("/supplement-buffer", post(handlers::supplement_buffer))
        // Sensor API passthrough
        .route("/sensor-api/health", get(handlers::source_health))
        .route("/sensor-api/status", get(handlers::source_status))
        .route("/sensor-api/sensors", get(handlers::source_sensors))
        .route("/sensor-api/all", get(handlers::source_all))
        .route("/sensor-api/latest/:count", get(handlers::source_latest))
        .route("/sensor-api/sensor/:name", get(handlers::source_sensor))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::StaticSource;
    use crate::buffer::TelemetryStore;
    use crate::inference::{PredictionService, ServiceSettings};
    use crate::models::ModelRegistry;
    use crate::preprocessing::Preprocessor;
    use crate::types::Reading;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state(source: StaticSource) -> AppState {
        let source: Arc<dyn crate::acquisition::TelemetrySource> = Arc::new(source);
        let service = PredictionService::new(
            Arc::new(TelemetryStore::new(60)),
            Arc::new(ModelRegistry::builder().build()),
            Arc::clone(&source),
            Preprocessor::default(),
            ServiceSettings::default(),
        );
        AppState {
            service: Arc::new(service),
            source,
        }
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn history(n: usize) -> Vec<Reading> {
        (0..n)
            .map(|i| Reading::new([1.0, 400.0, 120.0, 100.0 + i as f64, 100.0, 3.5, 15.0]))
            .collect()
    }

    #[tokio::test]
    async fn test_health_reports_buffer_and_models() {
        let app = api_routes(create_test_state(StaticSource::new(Vec::new())));
        let (status, body) = call(app, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["buffer_size"], 0);
        assert_eq!(body["data"]["models"]["forecaster_loaded"], false);
    }

    #[tokio::test]
    async fn test_current_empty_buffer_is_404() {
        let app = api_routes(create_test_state(StaticSource::new(Vec::new())));
        let (status, _) = call(app, Method::GET, "/current").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_forecaster_is_503() {
        let app = api_routes(create_test_state(StaticSource::new(history(80))));
        let (status, body) = call(app, Method::GET, "/forecast").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_unknown_policy_is_404_with_available() {
        let app = api_routes(create_test_state(StaticSource::new(history(5))));
        let (status, body) = call(app, Method::GET, "/rl_action/baseline").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["details"]["available_models"][0], "mock");
    }

    #[tokio::test]
    async fn test_mock_policy_action() {
        let app = api_routes(create_test_state(StaticSource::new(history(5))));
        let (status, body) = call(app, Method::GET, "/rl_action/mock").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_mock"], true);
        assert_eq!(body["data"]["source"], "raw");
    }

    #[tokio::test]
    async fn test_policy_without_any_data_is_400() {
        let app = api_routes(create_test_state(StaticSource::unavailable()));
        let (status, body) = call(app, Method::GET, "/rl_action/mock").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["required"], 1);
    }

    #[tokio::test]
    async fn test_supplement_fills_to_capacity() {
        let app = api_routes(create_test_state(StaticSource::new(history(100))));
        let (status, body) = call(app, Method::POST, "/supplement-buffer").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["buffer"]["raw_size"], 60);
        assert_eq!(body["data"]["buffer"]["readiness"]["forecast_ready"], true);
    }

    #[tokio::test]
    async fn test_latest_count_bounds() {
        let state = create_test_state(StaticSource::new(history(10)));
        for uri in ["/sensor-api/latest/0", "/sensor-api/latest/101", "/sensor-api/latest/abc"] {
            let (status, _) = call(api_routes(state.clone()), Method::GET, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        let (status, body) = call(api_routes(state), Method::GET, "/sensor-api/latest/3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_passthrough_failure_is_502() {
        let app = api_routes(create_test_state(StaticSource::unavailable()));
        let (status, _) = call(app, Method::GET, "/sensor-api/sensors").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_single_sensor_passthrough() {
        let state = create_test_state(StaticSource::new(history(3)));
        let (status, body) = call(api_routes(state.clone()), Method::GET, "/sensor-api/sensor/tbl_speed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["value"], 102.0);

        let (status, body) = call(api_routes(state), Method::GET, "/sensor-api/sensor/humidity").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
