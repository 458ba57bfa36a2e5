//! Prediction Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use storage::Prediction;

use crate::{ApiError, AppState};

/// Query parameters for a prediction run
#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    /// Readings in the window
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Alert threshold; the configured default when absent
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Run a prediction over the machine's recent readings.
///
/// A client that disconnects drops this future, which abandons any retry
/// in progress.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(params): Query<PredictQuery>,
) -> Result<Json<Prediction>, ApiError> {
    let prediction = state
        .pipeline
        .predictions
        .predict_for_machine(&machine_id, params.limit, params.threshold)
        .await?;
    Ok(Json(prediction))
}

/// Stored predictions, newest first
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    Ok(Json(
        state
            .pipeline
            .predictions
            .history_for_machine(&machine_id, params.limit)
            .await?,
    ))
}
