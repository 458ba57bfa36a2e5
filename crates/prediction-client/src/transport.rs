//! Outbound Transport

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use storage::{format_timestamp, SensorReading};
use thiserror::Error;

/// Failure of a single attempt
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    #[error("Response body is not JSON: {0}")]
    Decode(String),
}

/// One reading as sent upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireReading {
    pub ts: String,
    pub air_temperature: f64,
    pub process_temperature: f64,
    pub rotational_speed: i64,
    pub torque: f64,
    pub tool_wear: i64,
    pub metadata: Value,
}

impl From<&SensorReading> for WireReading {
    fn from(reading: &SensorReading) -> Self {
        Self {
            ts: format_timestamp(&reading.timestamp),
            air_temperature: reading.air_temperature,
            process_temperature: reading.process_temperature,
            rotational_speed: reading.rotational_speed,
            torque: reading.torque,
            tool_wear: reading.tool_wear,
            metadata: reading.metadata.clone(),
        }
    }
}

/// Request body for the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictRequest {
    pub machine_id: String,
    /// Newest first
    pub readings: Vec<WireReading>,
}

impl PredictRequest {
    pub fn from_window(machine_id: &str, window: &[SensorReading]) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            readings: window.iter().map(WireReading::from).collect(),
        }
    }
}

/// Sends one request to the scoring service
#[async_trait]
pub trait PredictionTransport: Send + Sync {
    async fn send(&self, request: &PredictRequest) -> Result<Value, TransportError>;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PredictionTransport for HttpTransport {
    async fn send(&self, request: &PredictRequest) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
