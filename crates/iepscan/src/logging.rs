//! Tracing subscriber setup.
//!
//! The crate logs through both `log` macros and `tracing` spans; the
//! `tracing-log` bridge routes the former into the same subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    tracing_log::LogTracer::init().map_err(|e| LoggingError::Install(e.to_string()))?;

    let registry = Registry::default().with(filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_config_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "iepscan=debug,warn".to_string(),
            json: false,
        };
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("iepscan=debug"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_config() {
        std::env::set_var("RUST_LOG", "trace");
        let config = LoggingConfig::default();
        let filter = build_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "trace");
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "iepscan=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(
            build_filter(&config),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }
}
