use std::path::{Path, PathBuf};

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads the config at `path` when given, else the default location if that
/// file exists, else built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            log::info!("Loading config from {}", path.display());
            load_config(&path)
        }
        _ => {
            log::info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns `~/.iepscan/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".iepscan").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::Validation {
            message: "server.port must be non-zero".to_string(),
        });
    }

    if config.upload.max_file_size == 0 {
        return Err(ConfigError::Validation {
            message: "upload.max_file_size must be greater than 0".to_string(),
        });
    }

    if config.extraction.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "extraction.worker_count must be greater than 0".to_string(),
        });
    }

    let temperature = config.extraction.temperature;
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Validation {
            message: format!(
                "extraction.temperature must be between 0 and 2, got {}",
                temperature
            ),
        });
    }

    for (index, token) in config.auth.tokens.iter().enumerate() {
        if !token.source().is_configured() {
            return Err(ConfigError::Validation {
                message: format!(
                    "auth.tokens[{}] for user '{}' has no token source",
                    index, token.user_id
                ),
            });
        }
    }

    Ok(())
}
