//! Predictive Maintenance Pipeline - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server};
use pipeline::Settings;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("invalid configuration")?;
    init_logging(&settings)?;

    info!("=== Maintenance Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        ml_service_url = %settings.ml_service_url,
        alert_threshold = settings.alert_threshold,
        "Starting ingestion and prediction service..."
    );

    run_server(settings).await
}
