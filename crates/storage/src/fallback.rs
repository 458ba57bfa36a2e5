//! Durable-First Storage With Volatile Fallback

use crate::{
    MemoryStore, Prediction, SensorReading, SqliteConfig, SqliteStore, StorageBackend,
    StorageError,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Routes every operation to the durable backend first and absorbs
/// `StorageError::Unavailable` by switching to the in-process store.
///
/// Reads merge both sides so records written during an outage stay visible
/// for the life of the process.
pub struct FallbackStorage {
    durable: Option<Arc<dyn StorageBackend>>,
    volatile: MemoryStore,
}

impl FallbackStorage {
    /// Wrap a durable backend
    pub fn new(durable: Arc<dyn StorageBackend>) -> Self {
        Self {
            durable: Some(durable),
            volatile: MemoryStore::new(),
        }
    }

    /// Run on the volatile store alone
    pub fn volatile_only() -> Self {
        Self {
            durable: None,
            volatile: MemoryStore::new(),
        }
    }

    /// Connect to SQLite if configured; an unreachable database at startup
    /// leaves the process running volatile-only.
    pub async fn connect(config: Option<&SqliteConfig>) -> Self {
        let Some(config) = config else {
            info!("No database configured; using in-memory store");
            return Self::volatile_only();
        };

        match SqliteStore::connect(config).await {
            Ok(store) => Self::new(Arc::new(store)),
            Err(e) => {
                warn!(
                    error = %e,
                    url = %config.url,
                    "Database unreachable at startup; using in-memory store"
                );
                Self::volatile_only()
            }
        }
    }

    /// Whether a durable backend is configured
    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Records currently held only in memory, as (readings, predictions)
    pub fn volatile_counts(&self) -> Result<(usize, usize), StorageError> {
        Ok((self.volatile.reading_count()?, self.volatile.prediction_count()?))
    }

    fn note_fallback(&self, backend: &str, op: &'static str, err: &StorageError) {
        warn!(backend, op, error = %err, "Durable storage unavailable; falling back to memory");
        metrics::counter!("storage_fallback_total", "op" => op).increment(1);
    }
}

#[async_trait]
impl StorageBackend for FallbackStorage {
    fn name(&self) -> &'static str {
        match &self.durable {
            Some(durable) => durable.name(),
            None => self.volatile.name(),
        }
    }

    async fn write_reading(&self, reading: &SensorReading) -> Result<Uuid, StorageError> {
        if let Some(durable) = &self.durable {
            match durable.write_reading(reading).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_unavailable() => {
                    self.note_fallback(durable.name(), "write_reading", &e)
                }
                Err(e) => return Err(e),
            }
        }
        self.volatile.insert_reading(reading.clone())
    }

    async fn query_readings(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SensorReading>, StorageError> {
        let Some(durable) = &self.durable else {
            return self.volatile.get_readings(machine_id, limit, offset);
        };

        if self.volatile.reading_count()? == 0 {
            match durable.query_readings(machine_id, limit, offset).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_unavailable() => {
                    self.note_fallback(durable.name(), "query_readings", &e);
                    return self.volatile.get_readings(machine_id, limit, offset);
                }
                Err(e) => return Err(e),
            }
        }

        let window = offset.saturating_add(limit);
        let local = self.volatile.get_readings(machine_id, window, 0)?;
        let remote = match durable.query_readings(machine_id, window, 0).await {
            Ok(rows) => rows,
            Err(e) if e.is_unavailable() => {
                self.note_fallback(durable.name(), "query_readings", &e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(merge_newest_first(remote, local, offset, limit, |a, b| {
            b.timestamp.cmp(&a.timestamp)
        }))
    }

    async fn write_prediction(&self, prediction: &Prediction) -> Result<Uuid, StorageError> {
        if let Some(durable) = &self.durable {
            match durable.write_prediction(prediction).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_unavailable() => {
                    self.note_fallback(durable.name(), "write_prediction", &e)
                }
                Err(e) => return Err(e),
            }
        }
        self.volatile.insert_prediction(prediction.clone())
    }

    async fn query_predictions(
        &self,
        machine_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Prediction>, StorageError> {
        let Some(durable) = &self.durable else {
            return self.volatile.get_predictions(machine_id, limit, offset);
        };

        let window = offset.saturating_add(limit);
        let local = self.volatile.get_predictions(machine_id, window, 0)?;
        let (query_limit, query_offset) = if local.is_empty() {
            (limit, offset)
        } else {
            (window, 0)
        };

        let remote = match durable
            .query_predictions(machine_id, query_limit, query_offset)
            .await
        {
            Ok(rows) if local.is_empty() => return Ok(rows),
            Ok(rows) => rows,
            Err(e) if e.is_unavailable() => {
                self.note_fallback(durable.name(), "query_predictions", &e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        Ok(merge_newest_first(remote, local, offset, limit, |a, b| {
            b.created_at.cmp(&a.created_at)
        }))
    }

    async fn machine_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut ids: BTreeSet<String> = self.volatile.get_machine_ids()?.into_iter().collect();

        if let Some(durable) = &self.durable {
            match durable.machine_ids().await {
                Ok(remote) => ids.extend(remote),
                Err(e) if e.is_unavailable() => {
                    self.note_fallback(durable.name(), "machine_ids", &e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ids.into_iter().collect())
    }
}

fn merge_newest_first<T>(
    mut remote: Vec<T>,
    local: Vec<T>,
    offset: usize,
    limit: usize,
    order: impl Fn(&T, &T) -> Ordering,
) -> Vec<T> {
    remote.extend(local);
    remote.sort_by(order);
    remote.into_iter().skip(offset).take(limit).collect()
}
