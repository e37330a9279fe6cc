//! HTTP client for the external sensor API
//!
//! Reading endpoints wrap their payload as `{"status": "success", "data": ...}`
//! and stamp records with offset-free ISO timestamps. `/api/status` and
//! `/api/sensor/{name}` are passed through as-is, `/api/sensors` lists its
//! names under `available_sensors`, and `/health` answers
//! `{"status": "healthy"}`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{SourceError, TelemetrySource};
use crate::config::SourceConfig;
use crate::types::Reading;

type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// [`TelemetrySource`] over the sensor API.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTelemetrySource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Response body as raw JSON.
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching from sensor API");

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            status if status.is_success() => Ok(resp.json().await?),
            reqwest::StatusCode::NOT_FOUND => Err(SourceError::NotFound(path.to_string())),
            status => Err(SourceError::Status(status)),
        }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, SourceError> {
        let body = self.get_json(path).await?;
        let envelope: Envelope<T> = serde_json::from_value(body)
            .map_err(|e| SourceError::Malformed(format!("{path}: {e}")))?;
        if envelope.status != "success" {
            return Err(SourceError::Malformed(format!(
                "{path} answered status '{}'{}",
                envelope.status,
                envelope.message.map(|m| format!(": {m}")).unwrap_or_default()
            )));
        }
        Ok(envelope.data)
    }

    async fn get_records(&self, path: &str) -> Result<Vec<Reading>, SourceError> {
        let records: Vec<Record> = self.get_data(path).await?.unwrap_or_default();
        Ok(records.iter().map(Reading::from_record).collect())
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_current(&self) -> Result<Option<Reading>, SourceError> {
        let record: Option<Record> = self.get_data("/api/current").await?;
        Ok(record.as_ref().map(Reading::from_record))
    }

    async fn fetch_latest(&self, n: usize) -> Result<Vec<Reading>, SourceError> {
        self.get_records(&format!("/api/latest/{n}")).await
    }

    async fn fetch_all(&self) -> Result<Vec<Reading>, SourceError> {
        self.get_records("/api/all").await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<HealthBody>()
                .await
                .map(|b| b.status == "healthy")
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                debug!(error = %e, "Sensor API health check failed");
                false
            }
        }
    }

    async fn fetch_status(&self) -> Result<serde_json::Value, SourceError> {
        self.get_json("/api/status").await
    }

    async fn fetch_sensors(&self) -> Result<Vec<String>, SourceError> {
        let mut body = self.get_json("/api/sensors").await?;
        let names = ["available_sensors", "data"]
            .iter()
            .find_map(|key| body.get_mut(*key).map(serde_json::Value::take))
            .ok_or_else(|| SourceError::Malformed("/api/sensors carries no sensor list".to_string()))?;
        serde_json::from_value(names).map_err(|e| SourceError::Malformed(format!("/api/sensors: {e}")))
    }

    async fn fetch_sensor(&self, name: &str) -> Result<serde_json::Value, SourceError> {
        self.get_json(&format!("/api/sensor/{name}")).await
    }

    fn source_name(&self) -> &str {
        "HTTP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    /// Record in the sensor API's shape, including its offset-free timestamp.
    fn record(i: usize) -> Value {
        json!({
            "timestamp": format!("2018-04-05T10:{:02}:00", i),
            "waste": i as f64,
            "produced": 400.0,
            "tbl_speed": 98.0,
        })
    }

    async fn sensor_value(Path(name): Path<String>) -> impl IntoResponse {
        if name == "waste" {
            (
                StatusCode::OK,
                Json(json!({"status": "success", "sensor_name": name, "value": 7.0})),
            )
        } else {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("Sensor \"{name}\" not found")})),
            )
        }
    }

    async fn spawn_sensor_api() -> String {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            .route(
                "/api/status",
                get(|| async { Json(json!({"status": "active", "data_loaded": true, "total_records": 10})) }),
            )
            .route(
                "/api/current",
                get(|| async { Json(json!({"status": "success", "data": record(7)})) }),
            )
            .route(
                "/api/latest/:n",
                get(|Path(n): Path<usize>| async move {
                    let data: Vec<Value> = (10 - n.min(10)..10).map(record).collect();
                    Json(json!({"status": "success", "data": data}))
                }),
            )
            .route(
                "/api/all",
                get(|| async {
                    Json(json!({"status": "error", "message": "dataset not loaded"}))
                }),
            )
            .route(
                "/api/sensors",
                get(|| async {
                    Json(json!({"status": "success", "available_sensors": ["waste", "SREL"]}))
                }),
            )
            .route("/api/sensor/:name", get(sensor_value));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_current_fills_missing_channels() {
        let url = spawn_sensor_api().await;
        let source = HttpTelemetrySource::new(&url, Duration::from_secs(5)).unwrap();

        let reading = source.fetch_current().await.unwrap().unwrap();
        assert_eq!(reading.get(Channel::Waste), 7.0);
        assert_eq!(reading.get(Channel::Ejection), 120.0);
        assert_eq!(reading.timestamp, Some(Utc.with_ymd_and_hms(2018, 4, 5, 10, 7, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_fetch_latest_preserves_order_and_timestamps() {
        let url = spawn_sensor_api().await;
        let source = HttpTelemetrySource::new(&format!("{url}/"), Duration::from_secs(5)).unwrap();

        let latest = source.fetch_latest(3).await.unwrap();
        let wastes: Vec<f64> = latest.iter().map(|r| r.get(Channel::Waste)).collect();
        assert_eq!(wastes, [7.0, 8.0, 9.0]);
        assert!(latest.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(latest.iter().all(|r| r.timestamp.is_some()));
    }

    #[tokio::test]
    async fn test_error_envelope_is_malformed() {
        let url = spawn_sensor_api().await;
        let source = HttpTelemetrySource::new(&url, Duration::from_secs(5)).unwrap();

        match source.fetch_all().await {
            Err(SourceError::Malformed(msg)) => assert!(msg.contains("dataset not loaded")),
            other => panic!("expected malformed envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_is_passed_through_untouched() {
        let url = spawn_sensor_api().await;
        let source = HttpTelemetrySource::new(&url, Duration::from_secs(5)).unwrap();

        let status = source.fetch_status().await.unwrap();
        assert_eq!(status, json!({"status": "active", "data_loaded": true, "total_records": 10}));
    }

    #[tokio::test]
    async fn test_health_sensors_and_single_sensor() {
        let url = spawn_sensor_api().await;
        let source = HttpTelemetrySource::new(&url, Duration::from_secs(5)).unwrap();

        assert!(source.health_check().await);
        assert_eq!(source.fetch_sensors().await.unwrap(), ["waste", "SREL"]);

        let waste = source.fetch_sensor("waste").await.unwrap();
        assert_eq!(waste["value"], 7.0);
        assert!(matches!(source.fetch_sensor("humidity").await, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_unhealthy() {
        let source =
            HttpTelemetrySource::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(!source.health_check().await);
        assert!(source.fetch_current().await.is_err());
    }
}
