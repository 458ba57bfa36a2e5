//! Machine Status Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use pipeline::{MachineStatus, ReadingWithPrediction};
use risk_engine::RiskSummary;
use serde::Deserialize;
use std::sync::Arc;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Latest values and risk tier of every machine
pub async fn list_machines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MachineStatus>>, ApiError> {
    Ok(Json(state.pipeline.status.machine_statuses().await?))
}

/// A machine's newest readings with their predictions
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<ReadingWithPrediction>>, ApiError> {
    Ok(Json(
        state
            .pipeline
            .status
            .recent(&machine_id, params.limit)
            .await?,
    ))
}

/// Machine counts per risk tier
pub async fn dashboard_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RiskSummary>, ApiError> {
    Ok(Json(state.pipeline.status.dashboard_summary().await?))
}
