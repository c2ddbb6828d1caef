//! Blob storage for uploaded documents.
//!
//! Uploads go through a one-time URL: [`ObjectStore::generate_upload_url`]
//! mints a ticket, [`ObjectStore::put`] consumes it and returns the stored
//! blob's metadata. Blobs are addressed by an opaque storage id.

mod local;

pub use local::LocalObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A one-time upload destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub ticket: String,
    pub url: String,
}

/// What the store knows about a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Mints a single-use upload URL.
    async fn generate_upload_url(&self) -> Result<UploadTarget, StorageError>;

    /// Stores `bytes` against a ticket from [`generate_upload_url`]. The
    /// ticket is consumed whether or not the write succeeds.
    ///
    /// [`generate_upload_url`]: ObjectStore::generate_upload_url
    async fn put(
        &self,
        ticket: &str,
        content_type: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<BlobMetadata, StorageError>;

    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError>;

    /// Returns `None` if the blob does not exist.
    async fn metadata(&self, id: &str) -> Result<Option<BlobMetadata>, StorageError>;

    /// A URL the blob can be fetched from, or `None` if it does not exist.
    async fn get_url(&self, id: &str) -> Result<Option<String>, StorageError>;

    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Validates a storage id. Ids are hyphenated UUIDs, which also keeps them
/// safe to use as file names.
pub fn validate_id(id: &str) -> Result<uuid::Uuid, StorageError> {
    uuid::Uuid::parse_str(id).map_err(|_| StorageError::InvalidId(id.to_string()))
}
