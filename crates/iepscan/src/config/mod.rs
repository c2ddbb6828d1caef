//! Service configuration: JSON file, schema-checked, with defaults for
//! every section.

pub mod loader;
pub mod schema;

use std::path::PathBuf;

use secrecy::SecretString;

pub use loader::{default_config_path, load_config, load_config_from_str, load_config_or_default};
pub use schema::{
    AuthConfig, Config, DatabaseConfig, ExtractionConfig, LoggingConfig, ServerConfig,
    StorageConfig, TokenConfig, UploadConfig,
};

use crate::error::ConfigError;

/// A bearer token resolved from its configured source.
pub struct ResolvedToken {
    pub user_id: String,
    pub token: SecretString,
}

impl std::fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("user_id", &self.user_id)
            .field("token", &"[redacted]")
            .finish()
    }
}

impl Config {
    /// Database file, falling back to `~/.iepscan/data/iepscan.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| data_root().join("data").join("iepscan.db"))
    }

    /// Blob directory, falling back to `~/.iepscan/blobs`.
    pub fn storage_directory(&self) -> PathBuf {
        self.storage
            .directory
            .clone()
            .unwrap_or_else(|| data_root().join("blobs"))
    }

    /// Resolves the extraction API key. `None` means extraction requests
    /// will fail until a key is provided.
    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, ConfigError> {
        self.extraction
            .api_key_source()
            .resolve_optional()
            .map_err(|source| ConfigError::Secret {
                name: "extraction.api_key".to_string(),
                source,
            })
    }

    /// Resolves every configured bearer token.
    pub fn resolve_tokens(&self) -> Result<Vec<ResolvedToken>, ConfigError> {
        self.auth
            .tokens
            .iter()
            .map(|entry| {
                let token = entry.source().resolve().map_err(|source| ConfigError::Secret {
                    name: format!("auth.tokens[{}]", entry.user_id),
                    source,
                })?;
                Ok(ResolvedToken {
                    user_id: entry.user_id.clone(),
                    token,
                })
            })
            .collect()
    }
}

fn data_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".iepscan")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert!(config.database_path().ends_with("data/iepscan.db"));
        assert!(config.storage_directory().ends_with("blobs"));
    }

    #[test]
    fn test_explicit_paths() {
        let config = load_config_from_str(
            r#"{"database": {"path": "/tmp/x.db"}, "storage": {"directory": "/tmp/blobs"}}"#,
        )
        .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(config.storage_directory(), PathBuf::from("/tmp/blobs"));
    }

    #[test]
    fn test_resolve_inline_tokens() {
        let config = load_config_from_str(
            r#"{"auth": {"tokens": [{"user_id": "u1", "token": "t1"}, {"user_id": "u2", "token": "t2"}]}}"#,
        )
        .unwrap();
        let tokens = config.resolve_tokens().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].user_id, "u2");
        assert_eq!(tokens[1].token.expose_secret(), "t2");
        assert!(!format!("{:?}", tokens[0]).contains("t1"));
    }

    #[test]
    fn test_inline_api_key() {
        let config =
            load_config_from_str(r#"{"extraction": {"api_key": "key-123"}}"#).unwrap();
        let key = config.resolve_api_key().unwrap().unwrap();
        assert_eq!(key.expose_secret(), "key-123");
    }

    #[test]
    fn test_missing_api_key_is_none() {
        let config = load_config_from_str(
            r#"{"extraction": {"api_key_env_var": "IEPSCAN_UNSET_KEY_VAR_987"}}"#,
        )
        .unwrap();
        assert!(config.resolve_api_key().unwrap().is_none());
    }
}
