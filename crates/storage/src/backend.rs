//! Storage Backend Contract

use crate::{Prediction, SensorReading, StorageError};
use async_trait::async_trait;
use uuid::Uuid;

/// Common interface over the durable and volatile stores.
///
/// Records carry their id before they reach a backend, so a write that is
/// retried against another backend keeps the same id. Queries return owned
/// copies ordered newest first.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs and metrics
    fn name(&self) -> &'static str;

    /// Persist a reading atomically
    async fn write_reading(&self, reading: &SensorReading) -> Result<Uuid, StorageError>;

    /// Readings, newest first, optionally filtered by machine
    async fn query_readings(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SensorReading>, StorageError>;

    /// Persist a prediction atomically
    async fn write_prediction(&self, prediction: &Prediction) -> Result<Uuid, StorageError>;

    /// Predictions, newest first, optionally filtered by machine
    async fn query_predictions(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>, StorageError>;

    /// Distinct machine ids that have at least one reading, sorted
    async fn machine_ids(&self) -> Result<Vec<String>, StorageError>;
}
