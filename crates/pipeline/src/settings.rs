//! Process Settings

use config::{Config, ConfigError, Environment, File};
use prediction_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use storage::SqliteConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Immutable process-wide settings, built once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// sqlx SQLite URL; empty runs on the in-memory store only
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_connect_timeout_secs: u64,
    /// Scoring endpoint
    pub ml_service_url: String,
    pub ml_max_attempts: u32,
    pub ml_backoff_base_ms: u64,
    pub ml_request_timeout_secs: u64,
    /// Default failure probability above which a prediction is flagged
    pub alert_threshold: f64,
    pub http_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Settings {
    /// Defaults, then `maintenance.toml` if present, then `PM_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(Some("maintenance"), None)
    }

    /// Build from an optional config file and an explicit environment map
    /// (`None` reads the process environment).
    pub fn from_sources(
        file: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        // `Settings::default()` is the single source of default values
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("PM").try_parsing(true).source(env))
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(ConfigError::Message(format!(
                "alert_threshold must be within [0, 1], got {}",
                self.alert_threshold
            )));
        }
        if self.ml_max_attempts == 0 {
            return Err(ConfigError::Message("ml_max_attempts must be at least 1".to_string()));
        }
        if self.ml_service_url.trim().is_empty() {
            return Err(ConfigError::Message("ml_service_url must be set".to_string()));
        }
        Ok(())
    }

    /// SQLite settings, or `None` when no database is configured
    pub fn sqlite_config(&self) -> Option<SqliteConfig> {
        if self.database_url.trim().is_empty() {
            return None;
        }
        Some(SqliteConfig {
            url: self.database_url.clone(),
            max_connections: self.database_max_connections.max(1),
            connect_timeout: Duration::from_secs(self.database_connect_timeout_secs),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.ml_service_url.clone(),
            max_attempts: self.ml_max_attempts,
            backoff_base: Duration::from_millis(self.ml_backoff_base_ms),
            request_timeout: Duration::from_secs(self.ml_request_timeout_secs),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://maintenance.db?mode=rwc".to_string(),
            database_max_connections: 5,
            database_connect_timeout_secs: 5,
            ml_service_url: "http://localhost:9000/predict".to_string(),
            ml_max_attempts: 5,
            ml_backoff_base_ms: 500,
            ml_request_timeout_secs: 15,
            alert_threshold: 0.7,
            http_addr: "0.0.0.0:8000".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            rate_limit_per_second: 1,
            rate_limit_burst: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_sources(None, env(&[])).unwrap();
        assert_eq!(settings.ml_max_attempts, 5);
        assert_eq!(settings.ml_backoff_base_ms, 500);
        assert_eq!(settings.alert_threshold, 0.7);
        assert_eq!(settings.log_format, LogFormat::Pretty);

        let client = settings.client_config();
        assert_eq!(client.backoff_base, Duration::from_millis(500));
        assert_eq!(client.endpoint, "http://localhost:9000/predict");
    }

    #[test]
    fn test_layered_defaults_match_default_impl() {
        let layered = Settings::from_sources(None, env(&[])).unwrap();
        assert_eq!(layered, Settings::default());
        assert_eq!(layered.database_url, "sqlite://maintenance.db?mode=rwc");
        assert_eq!(layered.rate_limit_burst, 50);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_sources(
            None,
            env(&[
                ("PM_ML_SERVICE_URL", "http://ml_service:5000/predict"),
                ("PM_ML_MAX_ATTEMPTS", "3"),
                ("PM_LOG_FORMAT", "json"),
                ("PM_DATABASE_URL", ""),
            ]),
        )
        .unwrap();

        assert_eq!(settings.ml_service_url, "http://ml_service:5000/predict");
        assert_eq!(settings.ml_max_attempts, 3);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.sqlite_config().is_none());
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let result = Settings::from_sources(None, env(&[("PM_ALERT_THRESHOLD", "1.5")]));
        assert!(result.is_err());
    }
}
