//! Persisted Records

use crate::StorageError;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single machine sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: Uuid,
    pub machine_id: String,
    /// When the reading was taken
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Air temperature (K)
    pub air_temperature: f64,
    /// Process temperature (K)
    pub process_temperature: f64,
    /// Spindle speed (RPM)
    pub rotational_speed: i64,
    /// Torque (Nm)
    pub torque: f64,
    /// Tool wear (minutes)
    pub tool_wear: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Result of one remote prediction call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    /// Newest reading of the window the prediction was made from
    pub sensor_reading_id: Option<Uuid>,
    pub machine_id: String,
    /// Timestamp of the newest reading in the window
    #[serde(rename = "ts")]
    pub reading_timestamp: Option<DateTime<Utc>>,
    pub model_version: Option<String>,
    #[serde(rename = "prediction_label")]
    pub label: String,
    pub failure_probability: Option<f64>,
    pub raw_scores: Value,
    pub raw_features: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 rendering, so text ordering matches time ordering
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// [`format_timestamp`] restricted to years 0000..=9999; anything else would
/// render with a sign and extra digits that RFC 3339 parsers reject.
pub fn storable_timestamp(ts: &DateTime<Utc>) -> Result<String, StorageError> {
    if (0..=9999).contains(&ts.year()) {
        Ok(format_timestamp(ts))
    } else {
        Err(StorageError::Serialization(format!(
            "timestamp {ts} outside years 0000..=9999"
        )))
    }
}
