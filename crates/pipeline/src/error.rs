//! Pipeline Error Types

use data_validator::ValidationError;
use prediction_client::PredictionError;
use storage::StorageError;
use thiserror::Error;

/// Errors surfaced to callers of the pipeline services
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing input; the request is rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The machine has no readings
    #[error("No readings found for machine {0}")]
    NotFound(String),

    /// The scoring service could not be reached; nothing was stored
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Prediction cancelled")]
    Cancelled,

    /// Storage failed even after fallback
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PredictionError> for PipelineError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::UpstreamUnavailable { .. } => {
                PipelineError::PredictionFailed(err.to_string())
            }
            PredictionError::Cancelled { .. } => PipelineError::Cancelled,
            PredictionError::Client(msg) => PipelineError::Internal(msg),
        }
    }
}
