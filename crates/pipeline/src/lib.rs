//! Ingestion-and-Prediction Pipeline
//!
//! Wires validated ingestion, the remote prediction call and the risk rules
//! onto a single storage handle.

mod error;
mod ingestion;
mod prediction;
mod settings;
mod status;

pub use error::PipelineError;
pub use ingestion::IngestionService;
pub use prediction::PredictionService;
pub use settings::{LogFormat, Settings};
pub use status::{MachineStatus, MachineStatusService, ReadingWithPrediction};

use data_validator::{ValidationConfig, Validator};
use prediction_client::PredictionClient;
use std::sync::Arc;
use storage::{FallbackStorage, StorageBackend};
use tracing::info;

/// Open the configured storage. An unreachable database leaves the process
/// running on the in-memory store.
pub async fn connect_storage(settings: &Settings) -> Arc<dyn StorageBackend> {
    Arc::new(FallbackStorage::connect(settings.sqlite_config().as_ref()).await)
}

/// All services sharing one storage handle
pub struct Pipeline {
    pub storage: Arc<dyn StorageBackend>,
    pub ingestion: IngestionService,
    pub predictions: PredictionService,
    pub status: MachineStatusService,
}

impl Pipeline {
    /// Connect storage and build the HTTP prediction client from settings
    pub async fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let storage = connect_storage(settings).await;
        let client = PredictionClient::new(&settings.client_config())?;

        info!(storage = storage.name(), "Pipeline ready");
        Ok(Self::with_parts(storage, client, settings))
    }

    /// Assemble from an explicit storage backend and client
    pub fn with_parts(
        storage: Arc<dyn StorageBackend>,
        client: PredictionClient,
        settings: &Settings,
    ) -> Self {
        let validator = || Validator::new(ValidationConfig::default());
        Self {
            ingestion: IngestionService::new(storage.clone(), validator()),
            predictions: PredictionService::new(
                storage.clone(),
                Arc::new(client),
                validator(),
                settings.alert_threshold,
            ),
            status: MachineStatusService::new(storage.clone(), validator()),
            storage,
        }
    }
}
