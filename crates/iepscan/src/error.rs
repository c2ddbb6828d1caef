use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by scan operations.
///
/// Each variant maps onto one failure class a caller can react to; lower
/// layers convert into these through the `From` impls below.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Not authenticated")]
    AuthenticationRequired,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Text extraction is already in progress")]
    AlreadyInProgress,

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl ScanError {
    /// Stable machine-readable code for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::AuthenticationRequired => "authentication_required",
            ScanError::InvalidInput(_) => "invalid_input",
            ScanError::Upstream(_) => "upstream_failure",
            ScanError::NotFound(_) => "not_found",
            ScanError::AlreadyInProgress => "already_in_progress",
            ScanError::Database(_) => "database",
        }
    }
}

impl From<StorageError> for ScanError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidTicket | StorageError::InvalidId(_) => {
                ScanError::InvalidInput(err.to_string())
            }
            other => ScanError::Upstream(other.to_string()),
        }
    }
}

impl From<ExtractionError> for ScanError {
    fn from(err: ExtractionError) -> Self {
        ScanError::Upstream(err.to_string())
    }
}

impl From<WorkerError> for ScanError {
    fn from(err: WorkerError) -> Self {
        ScanError::Upstream(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret for '{name}': {source}")]
    Secret {
        name: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write blob '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read blob '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete blob '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt blob metadata for '{id}': {reason}")]
    Metadata { id: String, reason: String },

    #[error("Upload URL is invalid, expired or already used")]
    InvalidTicket,

    #[error("Invalid storage id: {0}")]
    InvalidId(String),

    #[error("Blob not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No readable text could be extracted from this PDF document")]
    NoText,

    #[error("Extraction API request failed: {0}")]
    Request(String),

    #[error("Extraction API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed extraction API response: {0}")]
    MalformedResponse(String),

    #[error("Extraction API key is not configured")]
    MissingApiKey,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Extraction queue is closed")]
    QueueClosed,

    #[error("Extraction failed for scan {scan_id}: {message}")]
    Extraction { scan_id: String, message: String },

    #[error("Failed to record extraction result for scan {scan_id}: {source}")]
    Persist {
        scan_id: String,
        #[source]
        source: crate::db::DatabaseError,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;
