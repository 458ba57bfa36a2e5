//! Response Normalization
//!
//! The scoring service is a black box whose response shape has drifted over
//! time. Every field is looked up under each of its known names, first
//! non-null hit wins.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

const PROBABILITY_KEYS: [&str; 2] = ["failure_probability", "score"];
const LABEL_KEYS: [&str; 2] = ["prediction_label", "label"];
const MODEL_KEYS: [&str; 2] = ["model_version", "model_name"];
const SCORES_KEYS: [&str; 3] = ["raw_scores", "scores", "probabilities"];
const FEATURES_KEYS: [&str; 2] = ["raw_features", "features"];
const METADATA_KEYS: [&str; 2] = ["meta", "explain"];

/// Class index labels some model versions emit instead of names
const CLASS_LABELS: [&str; 3] = ["normal", "warning", "failure"];

/// Shape of the raw upstream body
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResponse {
    Document(Map<String, Value>),
    Array(Vec<Value>),
    Scalar(Value),
    Null,
}

impl From<Value> for RemoteResponse {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RemoteResponse::Document(map),
            Value::Array(items) => RemoteResponse::Array(items),
            Value::Null => RemoteResponse::Null,
            scalar => RemoteResponse::Scalar(scalar),
        }
    }
}

/// Canonical view of a prediction response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrediction {
    pub failure_probability: Option<f64>,
    pub label: Option<String>,
    pub model_version: Option<String>,
    pub raw_scores: Option<Value>,
    pub raw_features: Option<Value>,
    pub metadata: Value,
}

impl NormalizedPrediction {
    /// Normalize any upstream body
    pub fn from_response(response: RemoteResponse) -> Self {
        match response {
            RemoteResponse::Document(doc) => Self::from_document(&doc),
            RemoteResponse::Array(items) => Self::opaque(Value::Array(items)),
            RemoteResponse::Scalar(value) => Self::opaque(value),
            RemoteResponse::Null => Self::opaque(Value::Null),
        }
    }

    fn from_document(doc: &Map<String, Value>) -> Self {
        Self {
            failure_probability: first(doc, &PROBABILITY_KEYS).and_then(coerce_probability),
            label: first(doc, &LABEL_KEYS).map(coerce_label),
            model_version: first(doc, &MODEL_KEYS).map(coerce_text),
            raw_scores: first(doc, &SCORES_KEYS).cloned(),
            raw_features: first(doc, &FEATURES_KEYS).cloned(),
            metadata: first(doc, &METADATA_KEYS)
                .cloned()
                .unwrap_or_else(|| json!({})),
        }
    }

    fn opaque(value: Value) -> Self {
        Self {
            failure_probability: None,
            label: None,
            model_version: None,
            raw_scores: None,
            raw_features: None,
            metadata: json!({ "raw_ml_response": value }),
        }
    }

    /// Upstream label, else derived from the probability (missing counts as 0.0)
    pub fn resolved_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => label_for_probability(self.failure_probability.unwrap_or(0.0)).to_string(),
        }
    }
}

/// Fixed probability bands: `< 0.3` normal, `< 0.7` warning, else failure
pub fn label_for_probability(probability: f64) -> &'static str {
    if probability < 0.3 {
        "normal"
    } else if probability < 0.7 {
        "warning"
    } else {
        "failure"
    }
}

fn first<'a>(doc: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| doc.get(*key))
        .find(|value| !value.is_null())
}

fn coerce_probability(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    // out-of-range scores are kept as sent; the label bands still apply
    match parsed {
        Some(p) if p.is_finite() => Some(p),
        _ => {
            debug!(?value, "Discarding unparsable failure probability");
            None
        }
    }
}

fn coerce_label(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|idx| CLASS_LABELS.get(idx as usize))
            .map(|label| label.to_string())
            .unwrap_or_else(|| n.to_string()),
        other => coerce_text(other),
    }
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
