//! Remote Prediction Client
//!
//! Sends a window of recent readings to the external scoring service,
//! retrying with exponential backoff, and normalizes whatever document
//! shape comes back.

mod backoff;
mod client;
mod normalize;
mod transport;

pub use backoff::{RetryPolicy, Sleeper, TokioSleeper};
pub use client::{ClientConfig, PredictionClient};
pub use normalize::{label_for_probability, NormalizedPrediction, RemoteResponse};
pub use transport::{
    HttpTransport, PredictRequest, PredictionTransport, TransportError, WireReading,
};

use thiserror::Error;

/// Errors from a prediction call
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Prediction service unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },
    #[error("Prediction cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    #[error("Client setup failed: {0}")]
    Client(String),
}
