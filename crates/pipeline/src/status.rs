//! Machine Status and Dashboard Queries

use crate::PipelineError;
use chrono::{DateTime, Utc};
use data_validator::Validator;
use risk_engine::{classify, RiskLevel, RiskSummary};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use storage::{Prediction, SensorReading, StorageBackend};
use uuid::Uuid;

/// How far back `recent` looks for predictions to attach
const PREDICTION_LOOKBACK: usize = 2000;

/// Latest raw values and risk tier of one machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineStatus {
    pub machine_id: String,
    pub ts: Option<DateTime<Utc>>,
    /// Air temperature (K)
    pub temperature: Option<f64>,
    /// Rotational speed (RPM)
    pub vibration: Option<f64>,
    /// Torque (Nm)
    pub current: Option<f64>,
    /// Tool wear
    pub pressure: Option<i64>,
    pub risk: RiskLevel,
    pub metadata: Value,
}

/// A reading with the prediction that references it, if any
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingWithPrediction {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub prediction: Option<Prediction>,
}

/// Read-side queries that apply the risk rules to stored readings
pub struct MachineStatusService {
    storage: Arc<dyn StorageBackend>,
    validator: Validator,
}

impl MachineStatusService {
    pub fn new(storage: Arc<dyn StorageBackend>, validator: Validator) -> Self {
        Self { storage, validator }
    }

    /// Risk tier of a single reading; no reading at all is `Unknown`
    pub fn classify_reading(reading: Option<&SensorReading>) -> RiskLevel {
        classify(
            reading.map(|r| r.air_temperature),
            reading.map(|r| r.rotational_speed as f64),
            reading.map(|r| r.torque),
        )
    }

    /// Status of every machine that has readings, ordered by machine id
    pub async fn machine_statuses(&self) -> Result<Vec<MachineStatus>, PipelineError> {
        let mut statuses = Vec::new();
        for machine_id in self.storage.machine_ids().await? {
            let latest = self.latest_reading(&machine_id).await?;
            statuses.push(MachineStatus {
                risk: Self::classify_reading(latest.as_ref()),
                ts: latest.as_ref().map(|r| r.timestamp),
                temperature: latest.as_ref().map(|r| r.air_temperature),
                vibration: latest.as_ref().map(|r| r.rotational_speed as f64),
                current: latest.as_ref().map(|r| r.torque),
                pressure: latest.as_ref().map(|r| r.tool_wear),
                metadata: latest.map(|r| r.metadata).unwrap_or(Value::Null),
                machine_id,
            });
        }
        Ok(statuses)
    }

    /// Machine counts per risk tier
    pub async fn dashboard_summary(&self) -> Result<RiskSummary, PipelineError> {
        let mut summary = RiskSummary::default();
        for machine_id in self.storage.machine_ids().await? {
            let latest = self.latest_reading(&machine_id).await?;
            summary.record(Self::classify_reading(latest.as_ref()));
        }
        Ok(summary)
    }

    /// Newest readings of a machine, each with its prediction attached
    pub async fn recent(
        &self,
        machine_id: &str,
        limit: i64,
    ) -> Result<Vec<ReadingWithPrediction>, PipelineError> {
        let limit = self.validator.validate_window("limit", limit)?;
        let readings = self
            .storage
            .query_readings(Some(machine_id), limit, 0)
            .await?;

        let mut by_reading: HashMap<Uuid, Prediction> = HashMap::new();
        for prediction in self
            .storage
            .query_predictions(Some(machine_id), PREDICTION_LOOKBACK, 0)
            .await?
        {
            if let Some(reading_id) = prediction.sensor_reading_id {
                // newest first, so keep the first one seen
                by_reading.entry(reading_id).or_insert(prediction);
            }
        }

        Ok(readings
            .into_iter()
            .map(|reading| ReadingWithPrediction {
                prediction: by_reading.remove(&reading.id),
                reading,
            })
            .collect())
    }

    async fn latest_reading(
        &self,
        machine_id: &str,
    ) -> Result<Option<SensorReading>, PipelineError> {
        Ok(self
            .storage
            .query_readings(Some(machine_id), 1, 0)
            .await?
            .into_iter()
            .next())
    }
}
