//! Reading Ingestion

use crate::PipelineError;
use chrono::Utc;
use data_validator::Validator;
use serde_json::Value;
use std::sync::Arc;
use storage::{SensorReading, StorageBackend};
use tracing::debug;
use uuid::Uuid;

/// Validates raw payloads and writes them as sensor readings
pub struct IngestionService {
    storage: Arc<dyn StorageBackend>,
    validator: Validator,
}

impl IngestionService {
    pub fn new(storage: Arc<dyn StorageBackend>, validator: Validator) -> Self {
        Self { storage, validator }
    }

    /// Validate, assign an id and persist one reading
    pub async fn ingest(&self, payload: &Value) -> Result<Uuid, PipelineError> {
        let now = Utc::now();
        let valid = self.validator.validate_reading(payload, now)?;

        let reading = SensorReading {
            id: Uuid::new_v4(),
            machine_id: valid.machine_id,
            timestamp: valid.timestamp,
            air_temperature: valid.air_temperature,
            process_temperature: valid.process_temperature,
            rotational_speed: valid.rotational_speed,
            torque: valid.torque,
            tool_wear: valid.tool_wear,
            metadata: valid.metadata,
            created_at: now,
        };

        let id = self.storage.write_reading(&reading).await?;
        metrics::counter!("readings_ingested_total", "backend" => self.storage.name())
            .increment(1);
        debug!(%id, machine_id = %reading.machine_id, "Reading ingested");
        Ok(id)
    }

    /// Readings newest first; a blank machine id means no filter
    pub async fn list_readings(
        &self,
        machine_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SensorReading>, PipelineError> {
        let limit = self.validator.validate_list_limit(limit)?;
        let offset = self.validator.validate_offset(offset)?;
        let machine_id = machine_id.map(str::trim).filter(|m| !m.is_empty());

        let readings = self.storage.query_readings(machine_id, limit, offset).await?;
        debug!(?machine_id, limit, offset, count = readings.len(), "Listed readings");
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_validator::ValidationError;
    use serde_json::json;
    use storage::MemoryStore;

    fn service() -> IngestionService {
        IngestionService::new(Arc::new(MemoryStore::new()), Validator::default())
    }

    fn payload(machine: &str, air: f64) -> Value {
        json!({
            "machine_id": machine,
            "time": "2024-05-01T08:00:00Z",
            "air_temperature": air,
            "process_temperature": 310.2,
            "rotational_speed": 1500,
            "torque": 45.2,
            "tool_wear": 120
        })
    }

    #[tokio::test]
    async fn test_ingest_assigns_unique_ids() {
        let service = service();
        let a = service.ingest(&payload("m1", 300.0)).await.unwrap();
        let b = service.ingest(&payload("m1", 300.0)).await.unwrap();
        assert_ne!(a, b);

        let readings = service.list_readings(Some("m1"), 10, 0).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert!(readings.iter().all(|r| r.metadata == json!({})));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_stored() {
        let service = service();
        let mut bad = payload("m1", 300.0);
        bad.as_object_mut().unwrap().remove("tool_wear");

        let err = service.ingest(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::MissingField("tool_wear"))
        ));
        assert!(service.list_readings(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_bounds_and_blank_filter() {
        let service = service();
        service.ingest(&payload("m1", 300.0)).await.unwrap();
        service.ingest(&payload("m2", 300.0)).await.unwrap();

        assert_eq!(service.list_readings(Some(" "), 10, 0).await.unwrap().len(), 2);
        assert!(matches!(
            service.list_readings(None, 0, 0).await,
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            service.list_readings(None, 10, -1).await,
            Err(PipelineError::Validation(_))
        ));
    }
}
