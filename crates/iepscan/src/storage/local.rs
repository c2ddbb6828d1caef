use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moka::sync::Cache;
use tokio::io::AsyncWriteExt;

use super::{validate_id, BlobMetadata, ObjectStore, UploadTarget};
use crate::error::StorageError;

/// Outstanding upload tickets are bounded so an unauthenticated caller
/// cannot grow the cache without limit.
const MAX_OPEN_TICKETS: u64 = 10_000;

/// Object store backed by a local directory.
///
/// Each blob is `<id>.blob` with a `<id>.json` metadata sidecar.
pub struct LocalObjectStore {
    directory: PathBuf,
    base_url: String,
    tickets: Cache<String, ()>,
}

impl LocalObjectStore {
    /// Creates the store, creating `directory` if needed. URLs are built
    /// from `base_url`; tickets expire after `ticket_ttl`.
    pub fn new<P: AsRef<Path>>(
        directory: P,
        base_url: &str,
        ticket_ttl: Duration,
    ) -> Result<Self, StorageError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory).map_err(|e| StorageError::CreateDirectory {
            path: directory.clone(),
            source: e,
        })?;

        Ok(Self {
            directory,
            base_url: base_url.trim_end_matches('/').to_string(),
            tickets: Cache::builder()
                .max_capacity(MAX_OPEN_TICKETS)
                .time_to_live(ticket_ttl)
                .build(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, id: &uuid::Uuid) -> PathBuf {
        self.directory.join(format!("{}.blob", id))
    }

    fn meta_path(&self, id: &uuid::Uuid) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }

    async fn write_new(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let write_err = |e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(write_err)?;
        file.write_all(bytes).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn generate_upload_url(&self) -> Result<UploadTarget, StorageError> {
        let ticket = uuid::Uuid::new_v4().to_string();
        self.tickets.insert(ticket.clone(), ());
        log::debug!("Issued upload ticket {}", ticket);

        Ok(UploadTarget {
            url: format!("{}/api/storage/upload/{}", self.base_url, ticket),
            ticket,
        })
    }

    async fn put(
        &self,
        ticket: &str,
        content_type: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<BlobMetadata, StorageError> {
        // `get` honours expiry; `remove` decides which concurrent caller wins.
        let live = self.tickets.get(ticket).is_some();
        let claimed = self.tickets.remove(ticket).is_some();
        if !(live && claimed) {
            return Err(StorageError::InvalidTicket);
        }

        let id = uuid::Uuid::new_v4();
        let metadata = BlobMetadata {
            id: id.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            created_at: Utc::now(),
        };
        let sidecar = serde_json::to_vec_pretty(&metadata).map_err(|e| StorageError::Metadata {
            id: metadata.id.clone(),
            reason: e.to_string(),
        })?;

        let blob_path = self.blob_path(&id);
        Self::write_new(&blob_path, bytes).await?;
        if let Err(e) = Self::write_new(&self.meta_path(&id), &sidecar).await {
            let _ = tokio::fs::remove_file(&blob_path).await;
            return Err(e);
        }

        log::info!(
            "Stored blob {} ({}, {} bytes)",
            metadata.id,
            metadata.file_name,
            metadata.size
        );
        Ok(metadata)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let uuid = validate_id(id)?;
        let path = self.blob_path(&uuid);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    async fn metadata(&self, id: &str) -> Result<Option<BlobMetadata>, StorageError> {
        let uuid = validate_id(id)?;
        let path = self.meta_path(&uuid);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::ReadFile { path, source: e }),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StorageError::Metadata {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_url(&self, id: &str) -> Result<Option<String>, StorageError> {
        let uuid = validate_id(id)?;
        let exists = tokio::fs::try_exists(self.blob_path(&uuid))
            .await
            .map_err(|e| StorageError::ReadFile {
                path: self.blob_path(&uuid),
                source: e,
            })?;

        Ok(exists.then(|| format!("{}/api/storage/{}", self.base_url, uuid)))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let uuid = validate_id(id)?;
        let path = self.blob_path(&uuid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => return Err(StorageError::DeleteFile { path, source: e }),
        }

        let meta = self.meta_path(&uuid);
        if let Err(e) = tokio::fs::remove_file(&meta).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(StorageError::DeleteFile {
                    path: meta,
                    source: e,
                });
            }
        }

        log::info!("Deleted blob {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(dir.path(), "http://localhost:8080/", Duration::from_secs(60))
            .unwrap()
    }

    async fn upload(store: &LocalObjectStore, bytes: &[u8]) -> BlobMetadata {
        let target = store.generate_upload_url().await.unwrap();
        store
            .put(&target.ticket, "application/pdf", "sample.pdf", bytes)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_url_shape() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let target = store.generate_upload_url().await.unwrap();
        assert_eq!(
            target.url,
            format!("http://localhost:8080/api/storage/upload/{}", target.ticket)
        );
    }

    #[tokio::test]
    async fn test_put_get_metadata() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let meta = upload(&store, b"%PDF-1.7 body").await;

        assert_eq!(meta.size, 13);
        assert_eq!(store.get(&meta.id).await.unwrap(), b"%PDF-1.7 body");

        let read = store.metadata(&meta.id).await.unwrap().unwrap();
        assert_eq!(read, meta);
    }

    #[tokio::test]
    async fn test_ticket_is_single_use() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let target = store.generate_upload_url().await.unwrap();
        store
            .put(&target.ticket, "application/pdf", "a.pdf", b"one")
            .await
            .unwrap();
        let second = store
            .put(&target.ticket, "application/pdf", "a.pdf", b"two")
            .await;
        assert!(matches!(second, Err(StorageError::InvalidTicket)));
    }

    #[tokio::test]
    async fn test_unknown_ticket_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store.put("made-up", "application/pdf", "a.pdf", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidTicket)));
    }

    #[tokio::test]
    async fn test_expired_ticket_rejected() {
        let dir = TempDir::new().unwrap();
        let store =
            LocalObjectStore::new(dir.path(), "http://localhost", Duration::from_millis(20))
                .unwrap();
        let target = store.generate_upload_url().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let result = store.put(&target.ticket, "application/pdf", "a.pdf", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidTicket)));
    }

    #[tokio::test]
    async fn test_get_url_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let meta = upload(&store, b"data").await;

        let url = store.get_url(&meta.id).await.unwrap().unwrap();
        assert_eq!(url, format!("http://localhost:8080/api/storage/{}", meta.id));

        let missing = uuid::Uuid::new_v4().to_string();
        assert!(store.get_url(&missing).await.unwrap().is_none());
        assert!(store.metadata(&missing).await.unwrap().is_none());
        assert!(matches!(
            store.get(&missing).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let meta = upload(&store, b"data").await;

        store.delete(&meta.id).await.unwrap();
        assert!(store.metadata(&meta.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(&meta.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.get("../../secret").await,
            Err(StorageError::InvalidId(_))
        ));
    }
}
