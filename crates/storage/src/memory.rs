//! In-Process Volatile Store

use crate::{Prediction, SensorReading, StorageBackend, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Volatile store used when the durable backend is unreachable.
///
/// Everything is lost on restart. Each collection sits behind its own mutex;
/// queries clone matching records out so callers never iterate under the lock.
pub struct MemoryStore {
    readings: Mutex<VecDeque<SensorReading>>,
    predictions: Mutex<Vec<Prediction>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Creating in-memory store");
        Self {
            readings: Mutex::new(VecDeque::with_capacity(1024)),
            predictions: Mutex::new(Vec::with_capacity(128)),
        }
    }

    /// Append a reading
    pub fn insert_reading(&self, reading: SensorReading) -> Result<Uuid, StorageError> {
        let mut readings = self
            .readings
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let id = reading.id;
        readings.push_back(reading);
        debug!(%id, "Inserted reading into memory store");
        Ok(id)
    }

    /// Append a prediction
    pub fn insert_prediction(&self, prediction: Prediction) -> Result<Uuid, StorageError> {
        let mut predictions = self
            .predictions
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let id = prediction.id;
        predictions.push(prediction);
        debug!(%id, "Inserted prediction into memory store");
        Ok(id)
    }

    /// Readings newest first; equal timestamps keep reverse insertion order
    pub fn get_readings(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SensorReading>, StorageError> {
        let readings = self
            .readings
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let mut matching: Vec<SensorReading> = readings
            .iter()
            .rev()
            .filter(|r| machine_id.map_or(true, |m| r.machine_id == m))
            .cloned()
            .collect();
        drop(readings);

        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    /// Predictions newest first by creation time
    pub fn get_predictions(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>, StorageError> {
        let predictions = self
            .predictions
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let mut matching: Vec<Prediction> = predictions
            .iter()
            .rev()
            .filter(|p| machine_id.map_or(true, |m| p.machine_id == m))
            .cloned()
            .collect();
        drop(predictions);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    /// Distinct machine ids seen in readings
    pub fn get_machine_ids(&self) -> Result<Vec<String>, StorageError> {
        let readings = self
            .readings
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let ids: BTreeSet<String> = readings.iter().map(|r| r.machine_id.clone()).collect();
        Ok(ids.into_iter().collect())
    }

    /// Get total reading count
    pub fn reading_count(&self) -> Result<usize, StorageError> {
        self.readings
            .lock()
            .map(|r| r.len())
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Get total prediction count
    pub fn prediction_count(&self) -> Result<usize, StorageError> {
        self.predictions
            .lock()
            .map(|p| p.len())
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Poison the readings lock by panicking while it is held
    #[cfg(test)]
    pub(crate) fn poison_readings(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.readings.lock();
            panic!("writer panicked while holding the readings lock");
        }));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write_reading(&self, reading: &SensorReading) -> Result<Uuid, StorageError> {
        self.insert_reading(reading.clone())
    }

    async fn query_readings(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SensorReading>, StorageError> {
        self.get_readings(machine_id, limit, offset)
    }

    async fn write_prediction(&self, prediction: &Prediction) -> Result<Uuid, StorageError> {
        self.insert_prediction(prediction.clone())
    }

    async fn query_predictions(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>, StorageError> {
        self.get_predictions(machine_id, limit, offset)
    }

    async fn machine_ids(&self) -> Result<Vec<String>, StorageError> {
        self.get_machine_ids()
    }
}
