pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod iep;
pub mod logging;
pub mod scan;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod worker;

pub use broadcast::{ScanEvent, ScanEventBroadcaster, ScanEventKind};
pub use config::{load_config, load_config_or_default, Config};
pub use db::Database;
pub use error::{
    ConfigError, ExtractionError, Result, ScanError, StorageError, WorkerError,
};
pub use extraction::{FieldExtractor, GeminiClient, TextExtractor};
pub use iep::IepFields;
pub use scan::{ScanRecord, ScanStatus, NO_TEXT_SENTINEL};
pub use secrets::{SecretError, SecretSource};
pub use service::{Caller, ScanService, UploadRules, UploadedFile};
pub use storage::{LocalObjectStore, ObjectStore};
pub use worker::{ExtractionQueue, ExtractionWorker, WorkerPool};
