//! Ingestion Routes

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use storage::SensorReading;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Query parameters for listing readings
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub machine_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub id: Uuid,
}

/// Store one reading
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(payload) = payload?;
    let id = state.pipeline.ingestion.ingest(&payload).await?;
    Ok(Json(IngestResponse { status: "ok", id }))
}

/// List readings newest first
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<SensorReading>>, ApiError> {
    let readings = state
        .pipeline
        .ingestion
        .list_readings(params.machine_id.as_deref(), params.limit, params.offset)
        .await?;
    Ok(Json(readings))
}
