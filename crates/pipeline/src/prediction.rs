//! Prediction Orchestration

use crate::PipelineError;
use chrono::Utc;
use data_validator::Validator;
use prediction_client::PredictionClient;
use serde_json::{json, Value};
use std::sync::Arc;
use storage::{Prediction, StorageBackend};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs a machine's recent window through the scoring service and records
/// the result.
///
/// Two concurrent calls for the same machine each store their own record;
/// there is no deduplication.
pub struct PredictionService {
    storage: Arc<dyn StorageBackend>,
    client: Arc<PredictionClient>,
    validator: Validator,
    default_threshold: f64,
}

impl PredictionService {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        client: Arc<PredictionClient>,
        validator: Validator,
        default_threshold: f64,
    ) -> Self {
        Self {
            storage,
            client,
            validator,
            default_threshold,
        }
    }

    /// Predict from the newest `window_size` readings of `machine_id`
    pub async fn predict_for_machine(
        &self,
        machine_id: &str,
        window_size: i64,
        threshold: Option<f64>,
    ) -> Result<Prediction, PipelineError> {
        self.predict_for_machine_with_cancel(
            machine_id,
            window_size,
            threshold,
            &CancellationToken::new(),
        )
        .await
    }

    /// Same as [`predict_for_machine`](Self::predict_for_machine), abandoning
    /// the remote call at the next backoff boundary once `cancel` fires.
    pub async fn predict_for_machine_with_cancel(
        &self,
        machine_id: &str,
        window_size: i64,
        threshold: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<Prediction, PipelineError> {
        let window_size = self.validator.validate_window("limit", window_size)?;
        let threshold = self
            .validator
            .validate_threshold(threshold.unwrap_or(self.default_threshold))?;

        let window = self
            .storage
            .query_readings(Some(machine_id), window_size, 0)
            .await?;
        let newest = window
            .first()
            .ok_or_else(|| PipelineError::NotFound(machine_id.to_string()))?;

        let result = self
            .client
            .predict_with_cancel(machine_id, &window, cancel)
            .await?;

        let prediction = Prediction {
            id: Uuid::new_v4(),
            sensor_reading_id: Some(newest.id),
            machine_id: machine_id.to_string(),
            reading_timestamp: Some(newest.timestamp),
            label: result.resolved_label(),
            model_version: result.model_version,
            failure_probability: result.failure_probability,
            raw_scores: result.raw_scores.unwrap_or_else(empty_document),
            raw_features: result.raw_features.unwrap_or_else(empty_document),
            metadata: result.metadata,
            created_at: Utc::now(),
        };

        self.storage.write_prediction(&prediction).await?;
        metrics::counter!("predictions_stored_total", "label" => prediction.label.clone())
            .increment(1);

        info!(
            machine_id,
            prediction_id = %prediction.id,
            label = %prediction.label,
            failure_probability = ?prediction.failure_probability,
            window = window.len(),
            "Prediction stored"
        );

        if prediction
            .failure_probability
            .is_some_and(|p| p >= threshold)
        {
            warn!(
                machine_id,
                prediction_id = %prediction.id,
                threshold,
                "Failure probability at or above alert threshold"
            );
            metrics::counter!("prediction_alerts_total").increment(1);
        }

        Ok(prediction)
    }

    /// Stored predictions for a machine, newest first
    pub async fn history_for_machine(
        &self,
        machine_id: &str,
        limit: i64,
    ) -> Result<Vec<Prediction>, PipelineError> {
        let limit = self.validator.validate_window("limit", limit)?;
        Ok(self
            .storage
            .query_predictions(Some(machine_id), limit, 0)
            .await?)
    }
}

fn empty_document() -> Value {
    json!({})
}
