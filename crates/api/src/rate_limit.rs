//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Per-client-IP limits via tower_governor. Requires the service to be
//! served with `into_make_service_with_connect_info::<SocketAddr>()`.

use governor::middleware::StateInformationMiddleware;
use pipeline::Settings;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config keyed by peer IP, with X-RateLimit-* headers
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Seconds between quota replenishments
    pub per_second: u64,
    /// Requests allowed immediately
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 50,
        }
    }
}

impl From<&Settings> for RateLimitConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            per_second: settings.rate_limit_per_second,
            burst_size: settings.rate_limit_burst,
        }
    }
}

/// Build the governor config; `None` when a value is zero.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            rate_limit_per_second: 3,
            rate_limit_burst: 7,
            ..Default::default()
        };
        assert_eq!(
            RateLimitConfig::from(&settings),
            RateLimitConfig {
                per_second: 3,
                burst_size: 7
            }
        );
    }

    #[test]
    fn test_create_governor_config() {
        assert!(create_governor_config(&RateLimitConfig::default()).is_some());
        assert!(create_governor_config(&RateLimitConfig {
            per_second: 1,
            burst_size: 0
        })
        .is_none());
    }
}
