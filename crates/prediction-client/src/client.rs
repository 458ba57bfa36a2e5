//! Prediction Client Implementation

use crate::backoff::{RetryPolicy, Sleeper, TokioSleeper};
use crate::normalize::NormalizedPrediction;
use crate::transport::{HttpTransport, PredictRequest, PredictionTransport, TransportError};
use crate::PredictionError;
use std::sync::Arc;
use std::time::Duration;
use storage::SensorReading;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scoring endpoint URL
    pub endpoint: String,
    /// Total attempts per prediction (default: 5)
    pub max_attempts: u32,
    /// First backoff delay (default: 500ms)
    pub backoff_base: Duration,
    /// Per-request timeout (default: 15s)
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000/predict".to_string(),
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Client for the external scoring service.
///
/// Retries are local to one `predict` call; concurrent calls share nothing
/// but the underlying connection pool.
pub struct PredictionClient {
    transport: Arc<dyn PredictionTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl PredictionClient {
    /// Create an HTTP client from config
    pub fn new(config: &ClientConfig) -> Result<Self, PredictionError> {
        let transport = HttpTransport::new(&config.endpoint, config.request_timeout)
            .map_err(|e| PredictionError::Client(e.to_string()))?;

        info!(
            endpoint = %config.endpoint,
            max_attempts = config.max_attempts,
            backoff_base_ms = config.backoff_base.as_millis() as u64,
            "Creating prediction client"
        );

        Ok(Self::with_parts(
            Arc::new(transport),
            Arc::new(TokioSleeper),
            RetryPolicy::new(config.max_attempts, config.backoff_base),
        ))
    }

    /// Assemble a client from explicit parts
    pub fn with_parts(
        transport: Arc<dyn PredictionTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Score a window of readings (newest first)
    pub async fn predict(
        &self,
        machine_id: &str,
        window: &[SensorReading],
    ) -> Result<NormalizedPrediction, PredictionError> {
        self.predict_with_cancel(machine_id, window, &CancellationToken::new())
            .await
    }

    /// Score a window, giving up early once `cancel` fires.
    ///
    /// Each failed attempt is followed by `base * 2^attempt` of backoff, the
    /// last one included. Cancellation is checked before every attempt and
    /// interrupts any backoff in progress.
    pub async fn predict_with_cancel(
        &self,
        machine_id: &str,
        window: &[SensorReading],
        cancel: &CancellationToken,
    ) -> Result<NormalizedPrediction, PredictionError> {
        let request = PredictRequest::from_window(machine_id, window);
        let mut last_error: Option<TransportError> = None;

        for attempt in 0..self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(PredictionError::Cancelled { attempts: attempt });
            }

            metrics::counter!("prediction_attempts_total").increment(1);
            match self.transport.send(&request).await {
                Ok(body) => {
                    debug!(machine_id, attempt = attempt + 1, "Prediction service responded");
                    return Ok(NormalizedPrediction::from_response(body.into()));
                }
                Err(e) => {
                    warn!(
                        machine_id,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Prediction attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            let delay = self.policy.delay_for(attempt);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(PredictionError::Cancelled { attempts: attempt + 1 });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }

        metrics::counter!("prediction_failures_total").increment(1);
        Err(PredictionError::UpstreamUnavailable {
            attempts: self.policy.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}
