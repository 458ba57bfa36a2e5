//! End-to-end flow: ingest readings, predict against a mocked scoring
//! service, read the results back.

use async_trait::async_trait;
use pipeline::{Pipeline, PipelineError, Settings};
use prediction_client::{ClientConfig, PredictionClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use storage::{
    FallbackStorage, MemoryStore, Prediction, SensorReading, StorageBackend, StorageError,
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reading(machine: &str, time: &str, air: f64) -> Value {
    json!({
        "machine_id": machine,
        "time": time,
        "air_temperature": air,
        "process_temperature": 310.0,
        "rotational_speed": 1500,
        "torque": 40.0,
        "tool_wear": 10
    })
}

async fn scoring_service(response: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> PredictionClient {
    PredictionClient::new(&ClientConfig {
        endpoint: format!("{}/predict", server.uri()),
        max_attempts: 2,
        backoff_base: Duration::from_millis(1),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn pipeline_with(storage: Arc<dyn StorageBackend>, server: &MockServer) -> Pipeline {
    Pipeline::with_parts(storage, client_for(server), &Settings::default())
}

#[tokio::test]
async fn test_ingest_then_predict_uses_newest_window() {
    let server = scoring_service(json!({"failure_probability": 0.42})).await;
    let pipeline = pipeline_with(Arc::new(MemoryStore::new()), &server);

    let mut ids = Vec::new();
    for (time, air) in [
        ("2024-05-01T08:00:00Z", 305.5),
        ("2024-05-01T08:01:00Z", 308.1),
        ("2024-05-01T08:02:00Z", 310.0),
    ] {
        ids.push(
            pipeline
                .ingestion
                .ingest(&reading("machine_01", time, air))
                .await
                .unwrap(),
        );
    }

    let prediction = pipeline
        .predictions
        .predict_for_machine("machine_01", 3, None)
        .await
        .unwrap();

    assert_eq!(prediction.label, "warning");
    assert_eq!(prediction.failure_probability, Some(0.42));
    assert_eq!(prediction.sensor_reading_id, Some(ids[2]));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["machine_id"], "machine_01");
    assert_eq!(body["readings"].as_array().unwrap().len(), 3);

    let history = pipeline
        .predictions
        .history_for_machine("machine_01", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, prediction.id);

    let recent = pipeline.status.recent("machine_01", 3).await.unwrap();
    assert_eq!(recent[0].reading.id, ids[2]);
    assert_eq!(
        recent[0].prediction.as_ref().map(|p| p.id),
        Some(prediction.id)
    );
    assert!(recent[1].prediction.is_none());
}

#[tokio::test]
async fn test_window_only_covers_requested_machine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"machine_id": "m2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"label": "normal"})))
        .mount(&server)
        .await;
    let pipeline = pipeline_with(Arc::new(MemoryStore::new()), &server);

    pipeline
        .ingestion
        .ingest(&reading("m1", "2024-05-01T08:00:00Z", 300.0))
        .await
        .unwrap();
    let m2 = pipeline
        .ingestion
        .ingest(&reading("m2", "2024-05-01T07:00:00Z", 300.0))
        .await
        .unwrap();

    let prediction = pipeline
        .predictions
        .predict_for_machine("m2", 50, None)
        .await
        .unwrap();
    assert_eq!(prediction.sensor_reading_id, Some(m2));
    assert_eq!(prediction.label, "normal");
}

#[tokio::test]
async fn test_concurrent_predictions_are_both_stored() {
    let server = scoring_service(json!({"failure_probability": 0.1})).await;
    let pipeline = Arc::new(pipeline_with(Arc::new(MemoryStore::new()), &server));
    pipeline
        .ingestion
        .ingest(&reading("m1", "2024-05-01T08:00:00Z", 300.0))
        .await
        .unwrap();

    let a = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.predictions.predict_for_machine("m1", 5, None).await })
    };
    let b = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.predictions.predict_for_machine("m1", 5, None).await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_ne!(a.id, b.id);
    let history = pipeline
        .predictions
        .history_for_machine("m1", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_unreachable_scoring_service_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let pipeline = pipeline_with(Arc::new(MemoryStore::new()), &server);
    pipeline
        .ingestion
        .ingest(&reading("m1", "2024-05-01T08:00:00Z", 300.0))
        .await
        .unwrap();

    let err = pipeline
        .predictions
        .predict_for_machine("m1", 5, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PredictionFailed(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert!(pipeline
        .predictions
        .history_for_machine("m1", 10)
        .await
        .unwrap()
        .is_empty());
}

/// Durable backend whose database is gone
struct Unreachable;

#[async_trait]
impl StorageBackend for Unreachable {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn write_reading(&self, _: &SensorReading) -> Result<Uuid, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn query_readings(
        &self,
        _: Option<&str>,
        _: usize,
        _: usize,
    ) -> Result<Vec<SensorReading>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn write_prediction(&self, _: &Prediction) -> Result<Uuid, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn query_predictions(
        &self,
        _: Option<&str>,
        _: usize,
        _: usize,
    ) -> Result<Vec<Prediction>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn machine_ids(&self) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_pipeline_keeps_working_when_database_is_down() {
    let server = scoring_service(json!({"failure_probability": 0.9})).await;
    let storage = Arc::new(FallbackStorage::new(Arc::new(Unreachable)));
    let pipeline = pipeline_with(storage.clone(), &server);

    let id = pipeline
        .ingestion
        .ingest(&reading("m1", "2024-05-01T08:00:00Z", 316.0))
        .await
        .unwrap();
    let prediction = pipeline
        .predictions
        .predict_for_machine("m1", 5, None)
        .await
        .unwrap();

    assert_eq!(prediction.sensor_reading_id, Some(id));
    assert_eq!(prediction.label, "failure");
    assert_eq!(storage.volatile_counts().unwrap(), (1, 1));

    let statuses = pipeline.status.machine_statuses().await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].risk.as_str(), "Danger");
    assert_eq!(pipeline.status.dashboard_summary().await.unwrap().failure_count, 1);
}
