//! Field Normalization
//!
//! Lenient coercions for the fields that never reject a payload: machine id,
//! timestamp and metadata.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Machine id used when the payload does not name one
pub const UNKNOWN_MACHINE: &str = "unknown";

/// Years that render as fixed-width four-digit RFC 3339
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 0..=9999;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// First non-blank of `machine_id` / `machineId`, else `"unknown"`
pub fn resolve_machine_id(payload: &Map<String, Value>) -> String {
    ["machine_id", "machineId"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_MACHINE.to_string())
}

/// Parse a reading timestamp, falling back to `now`.
///
/// Accepts RFC 3339, naive ISO-8601 (taken as UTC) and Unix seconds given as
/// a number or numeric string. Instants outside years 0000..=9999 (epoch
/// milliseconds sent as seconds, for one) count as unparsable.
pub fn parse_timestamp(value: Option<&Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = match value {
        Some(Value::String(s)) => parse_text(s.trim()),
        Some(Value::Number(n)) => n.as_f64().and_then(from_epoch_seconds),
        _ => None,
    }
    .filter(|ts| YEAR_RANGE.contains(&ts.year()));

    parsed.unwrap_or_else(|| {
        if value.is_some_and(|v| !v.is_null()) {
            debug!(?value, "Unparsable timestamp; using ingestion time");
        }
        now
    })
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch_seconds)
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Metadata must be a JSON object; absent becomes `{}` and anything else is
/// wrapped as `{"raw_metadata": "<text>"}`.
pub fn normalize_metadata(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => json!({}),
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(s)) => json!({ "raw_metadata": s }),
        Some(other) => json!({ "raw_metadata": other.to_string() }),
    }
}
