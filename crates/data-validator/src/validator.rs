//! Ingest Payload Validator

use crate::error::ValidationError;
use crate::normalizer::{normalize_metadata, parse_timestamp, resolve_machine_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Largest page size for reading listings
    pub max_list_limit: usize,
    /// Largest prediction window and history page
    pub max_window: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_list_limit: 5000,
            max_window: 2000,
        }
    }
}

/// Reading that passed validation, not yet assigned an id
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReading {
    pub machine_id: String,
    pub timestamp: DateTime<Utc>,
    pub air_temperature: f64,
    pub process_temperature: f64,
    pub rotational_speed: i64,
    pub torque: f64,
    pub tool_wear: i64,
    pub metadata: Value,
}

/// Validator for ingest payloads and query bounds
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a raw ingest payload.
    ///
    /// The five sensor values are mandatory. Machine id, timestamp and
    /// metadata are normalized instead of rejected.
    pub fn validate_reading(
        &self,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<ValidatedReading, ValidationError> {
        let fields = payload.as_object().ok_or_else(|| {
            ValidationError::InvalidFormat(format!(
                "expected a JSON object, got {}",
                kind(payload)
            ))
        })?;

        let time = ["time", "ts", "timestamp"]
            .iter()
            .find_map(|key| fields.get(*key).filter(|v| !v.is_null()));

        Ok(ValidatedReading {
            machine_id: resolve_machine_id(fields),
            timestamp: parse_timestamp(time, now),
            air_temperature: float_field(fields, "air_temperature")?,
            process_temperature: float_field(fields, "process_temperature")?,
            rotational_speed: integer_field(fields, "rotational_speed")?,
            torque: float_field(fields, "torque")?,
            tool_wear: integer_field(fields, "tool_wear")?,
            metadata: normalize_metadata(fields.get("metadata")),
        })
    }

    /// Page size for reading listings
    pub fn validate_list_limit(&self, limit: i64) -> Result<usize, ValidationError> {
        check_positive("limit", limit, self.config.max_list_limit)
    }

    /// Window size for predictions and page size for history
    pub fn validate_window(
        &self,
        field: &'static str,
        size: i64,
    ) -> Result<usize, ValidationError> {
        check_positive(field, size, self.config.max_window)
    }

    /// Pagination offset
    pub fn validate_offset(&self, offset: i64) -> Result<usize, ValidationError> {
        usize::try_from(offset).map_err(|_| ValidationError::OutOfRange {
            field: "offset",
            value: offset as f64,
            min: 0.0,
            max: i64::MAX as f64,
        })
    }

    /// Probability threshold in [0, 1]
    pub fn validate_threshold(&self, threshold: f64) -> Result<f64, ValidationError> {
        if (0.0..=1.0).contains(&threshold) {
            Ok(threshold)
        } else {
            Err(ValidationError::OutOfRange {
                field: "threshold",
                value: threshold,
                min: 0.0,
                max: 1.0,
            })
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn check_positive(field: &'static str, value: i64, max: usize) -> Result<usize, ValidationError> {
    match usize::try_from(value) {
        Ok(v) if v >= 1 && v <= max => Ok(v),
        _ => Err(ValidationError::OutOfRange {
            field,
            value: value as f64,
            min: 1.0,
            max: max as f64,
        }),
    }
}

fn float_field(fields: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = match fields.get(field) {
        None | Some(Value::Null) => return Err(ValidationError::MissingField(field)),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field,
                reason: format!("expected a number, got {}", kind(other)),
            })
        }
    };

    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::InvalidField {
            field,
            reason: "not a finite number".to_string(),
        }),
    }
}

fn integer_field(fields: &Map<String, Value>, field: &'static str) -> Result<i64, ValidationError> {
    if let Some(n) = fields.get(field).and_then(Value::as_i64) {
        return Ok(n);
    }

    let value = float_field(fields, field)?;
    if value.fract() != 0.0 || value < i64::MIN as f64 || value > i64::MAX as f64 {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("expected an integer, got {value}"),
        });
    }
    Ok(value as i64)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
