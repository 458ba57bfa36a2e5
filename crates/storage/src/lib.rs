//! Storage Layer
//!
//! Persistence for sensor readings and predictions. A SQLite backend is the
//! durable store; an in-process store takes over whenever SQLite is
//! unreachable.

mod backend;
mod fallback;
mod memory;
mod models;
mod sqlite;

pub use backend::StorageBackend;
pub use fallback::FallbackStorage;
pub use memory::MemoryStore;
pub use models::{format_timestamp, storable_timestamp, Prediction, SensorReading};
pub use sqlite::{SqliteConfig, SqliteStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached (connection refused, pool closed, I/O).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Lock error: {0}")]
    Lock(String),
}

impl StorageError {
    /// Whether the failure should be absorbed by the fallback store
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(e) if is_infrastructure_fault(e.code().as_deref()) => {
                StorageError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(e) => StorageError::Query(e.to_string()),
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => StorageError::Query(err.to_string()),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

/// SQLite primary result codes for a database that is there but cannot take
/// the operation right now: BUSY, LOCKED, READONLY, IOERR, FULL, CANTOPEN.
const INFRASTRUCTURE_CODES: [i32; 6] = [5, 6, 8, 10, 13, 14];

fn is_infrastructure_fault(code: Option<&str>) -> bool {
    // extended codes carry the primary code in the low byte
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| INFRASTRUCTURE_CODES.contains(&(c & 0xff)))
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
