use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::SecretSource;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            extraction: ExtractionConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL clients use to reach this server. Upload and download URLs
    /// handed out by the object store are built from it.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `~/.iepscan/data/iepscan.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Blob directory. Defaults to `~/.iepscan/blobs`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_upload_url_ttl")]
    pub upload_url_ttl_secs: u64,
}

fn default_upload_url_ttl() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: None,
            upload_url_ttl_secs: default_upload_url_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted upload in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Run the second stage that pulls IEP fields out of the raw text.
    #[serde(default)]
    pub structured_fields: bool,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_api_key_env_var() -> Option<String> {
    Some("GEMINI_API_KEY".to_string())
}

fn default_worker_count() -> usize {
    2
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            worker_count: default_worker_count(),
            request_timeout_secs: default_request_timeout(),
            structured_fields: false,
        }
    }
}

impl ExtractionConfig {
    pub fn api_key_source(&self) -> SecretSource<'_> {
        SecretSource {
            inline: self.api_key.as_deref(),
            file: self.api_key_file.as_deref(),
            env_var: self.api_key_env_var.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// A bearer token and the user it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub user_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub token_env_var: Option<String>,
}

impl TokenConfig {
    pub fn source(&self) -> SecretSource<'_> {
        SecretSource {
            inline: self.token.as_deref(),
            file: self.token_file.as_deref(),
            env_var: self.token_env_var.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
