//! HTTP Error Mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use data_validator::ValidationError;
use pipeline::PipelineError;
use serde::Serialize;
use tracing::{error, warn};

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A pipeline failure on its way to becoming an HTTP response
#[derive(Debug)]
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::PredictionFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // details of upstream and internal failures stay in the log
        let message = match &self.0 {
            PipelineError::Validation(_) | PipelineError::NotFound(_) => self.0.to_string(),
            PipelineError::PredictionFailed(_) => {
                warn!(error = %self.0, "Prediction service unavailable");
                "prediction service unavailable".to_string()
            }
            _ => {
                error!(error = %self.0, "Request failed");
                "internal error".to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PipelineError::Validation(ValidationError::InvalidFormat(
            rejection.body_text(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::PipelineError;
    use storage::StorageError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PipelineError::NotFound("m1".into()), StatusCode::NOT_FOUND),
            (
                PipelineError::PredictionFailed("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (PipelineError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
            (
                PipelineError::Storage(StorageError::Query("syntax".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
