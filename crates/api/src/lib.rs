//! Predictive Maintenance API Server
//!
//! Thin HTTP adapter over the ingestion, prediction and status services.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pipeline::{LogFormat, Pipeline, Settings};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod error;
mod rate_limit;
mod routes;

pub use error::{ApiError, ErrorResponse};
pub use rate_limit::{create_governor_config, RateLimitConfig};

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: Pipeline,
    pub version: String,
    pub start_time: std::time::Instant,
    /// Prometheus renderer; absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            pipeline,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: String,
}

/// Create the application router, without rate limiting
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/ingest",
            post(routes::ingest::ingest).get(routes::ingest::list),
        )
        .route("/api/v1/machines", get(routes::machines::list_machines))
        .route("/api/v1/machines/:id/recent", get(routes::machines::recent))
        .route(
            "/api/v1/machines/:id/predict",
            post(routes::predictions::predict),
        )
        .route(
            "/api/v1/machines/:id/prediction-history",
            get(routes::predictions::history),
        )
        .route(
            "/api/v1/dashboard/summary",
            get(routes::machines::dashboard_summary),
        )
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: state.pipeline.storage.name().to_string(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

/// Initialize logging in the configured format
pub fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let level: Level = settings
        .log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level: {}", settings.log_level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match settings.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

/// Run the server until it fails
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    let pipeline = Pipeline::from_settings(&settings).await?;
    let state = Arc::new(AppState::new(pipeline, metrics));

    let governor = create_governor_config(&RateLimitConfig::from(&settings))
        .ok_or_else(|| anyhow::anyhow!("rate limit values must be non-zero"))?;

    let app = create_router(state)
        .layer(GovernorLayer { config: governor })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Starting API server on {}", settings.http_addr);

    let listener = tokio::net::TcpListener::bind(&settings.http_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
