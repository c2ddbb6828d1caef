//! Upload handler and query surface.
//!
//! [`ScanService`] owns no global state; its collaborators are injected at
//! construction. Core operations return `Result<_, ScanError>`. The
//! envelope wrappers ([`ScanService::upload_pdf`],
//! [`ScanService::get_download_url`]) fold every failure into a
//! `{success: false, error}` value instead.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tracing::Instrument;

use crate::broadcast::{ScanEvent, ScanEventBroadcaster, ScanEventKind};
use crate::config::UploadConfig;
use crate::db::stats_repo::{self, ScanStats, STATS_SAMPLE_LIMIT};
use crate::db::scan_repo::{self, RetryOutcome, ScanFilter, TriggerOutcome};
use crate::db::Database;
use crate::error::{Result, ScanError, StorageError};
use crate::scan::{NewScan, ScanRecord, ScanStatus};
use crate::storage::{BlobMetadata, ObjectStore, UploadTarget};
use crate::worker::{ExtractionJob, ExtractionQueue};

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const PDF_EXTENSION: &str = ".pdf";
pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 100;

const MSG_BLOB_NOT_FOUND: &str = "File not found in storage";
const MSG_INVALID_FILE: &str = "Invalid or missing file";
const MSG_NOT_PDF: &str = "Only PDF files are allowed";
const MSG_RECORD_FAILED: &str = "Failed to store scan metadata";
const MSG_NO_DOWNLOAD_URL: &str = "Could not generate download URL";
const MSG_SCAN_NOT_FOUND: &str = "Scan not found";

/// The authenticated user making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

/// A file as received from the client.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// What uploads must satisfy. Clients can mirror these checks before
/// sending anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRules {
    pub accepted_mime_types: Vec<String>,
    pub accepted_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl UploadRules {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            accepted_mime_types: vec![PDF_MIME_TYPE.to_string()],
            accepted_extensions: vec![PDF_EXTENSION.to_string()],
            max_file_size: config.max_file_size,
        }
    }

    /// A file is a PDF if its declared type or its extension says so.
    pub fn is_pdf(&self, file_name: &str, content_type: Option<&str>) -> bool {
        let declared = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim())
            .is_some_and(|ct| {
                self.accepted_mime_types
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(ct))
            });
        let lower = file_name.to_ascii_lowercase();
        declared || self.accepted_extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Checks a file against the rules, returning its name on success.
    pub fn check<'a>(&self, file: &'a UploadedFile) -> Result<&'a str> {
        let file_name = file
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ScanError::InvalidInput(MSG_INVALID_FILE.to_string()))?;

        if !self.is_pdf(file_name, file.content_type.as_deref()) {
            return Err(ScanError::InvalidInput(MSG_NOT_PDF.to_string()));
        }
        if file.bytes.is_empty() {
            return Err(ScanError::InvalidInput(MSG_INVALID_FILE.to_string()));
        }
        if file.bytes.len() as u64 > self.max_file_size {
            return Err(ScanError::InvalidInput(format!(
                "File exceeds the maximum size of {} bytes",
                self.max_file_size
            )));
        }
        Ok(file_name)
    }
}

impl Default for UploadRules {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub scan: ScanRecord,
    pub filename: String,
}

/// Result envelope of an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UploadData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn ok(scan: ScanRecord) -> Self {
        Self {
            success: true,
            message: Some("PDF uploaded successfully".to_string()),
            data: Some(UploadData {
                filename: scan.file_name.clone(),
                scan: scan.clone(),
            }),
            scan: Some(scan),
            error: None,
        }
    }

    pub fn err(error: &ScanError) -> Self {
        Self {
            success: false,
            message: None,
            scan: None,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<ScanRecord>> for UploadResult {
    fn from(result: Result<ScanRecord>) -> Self {
        match result {
            Ok(scan) => Self::ok(scan),
            Err(e) => Self::err(&e),
        }
    }
}

/// Result envelope of a download-URL request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String>> for DownloadResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(url) => Self {
                success: true,
                download_url: Some(url),
                error: None,
            },
            Err(_) => Self {
                success: false,
                download_url: None,
                error: Some(MSG_NO_DOWNLOAD_URL.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub deleted_id: String,
    pub message: String,
}

/// One page of scans.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    pub results: Vec<ScanRecord>,
    pub has_more: bool,
    /// Rows read to build the page (offset + limit + 1 at most), not the
    /// size of the table.
    #[serde(rename = "total")]
    pub scanned: u64,
}

/// Upload handler and query surface over the scan store.
#[derive(Clone)]
pub struct ScanService {
    db: Database,
    store: Arc<dyn ObjectStore>,
    queue: ExtractionQueue,
    events: ScanEventBroadcaster,
    rules: UploadRules,
}

impl ScanService {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        queue: ExtractionQueue,
        events: ScanEventBroadcaster,
        rules: UploadRules,
    ) -> Self {
        Self {
            db,
            store,
            queue,
            events,
            rules,
        }
    }

    pub fn upload_rules(&self) -> &UploadRules {
        &self.rules
    }

    pub fn events(&self) -> &ScanEventBroadcaster {
        &self.events
    }

    /// Validates, stores and records an uploaded PDF, then schedules
    /// extraction. A scheduling failure does not fail the upload.
    pub async fn upload(&self, caller: Option<&Caller>, file: Option<UploadedFile>) -> Result<ScanRecord> {
        let caller = caller.ok_or(ScanError::AuthenticationRequired)?;
        let file = file.ok_or_else(|| ScanError::InvalidInput(MSG_INVALID_FILE.to_string()))?;
        let file_name = self.rules.check(&file)?.to_string();

        let span = tracing::info_span!("upload", user_id = %caller.user_id, file_name = %file_name);
        async {
            let blob = self
                .store_blob(&file_name, declared_type(&file, &file_name), &file.bytes)
                .await
                .map_err(|e| ScanError::Upstream(format!("Upload failed: {}", e)))?;

            let new_scan = NewScan {
                file_id: blob.id.clone(),
                file_name: file_name.clone(),
                file_size: Some(blob.size),
                mime_type: Some(blob.content_type.clone()),
                user_id: Some(caller.user_id.clone()),
                status: ScanStatus::Pending,
            };
            let scan = match scan_repo::insert(&self.db, &new_scan, Utc::now()) {
                Ok(scan) => scan,
                Err(e) => {
                    warn!("Failed to record scan for blob {}: {}", blob.id, e);
                    if let Err(e) = self.store.delete(&blob.id).await {
                        warn!("Failed to remove orphaned blob {}: {}", blob.id, e);
                    }
                    return Err(ScanError::Upstream(MSG_RECORD_FAILED.to_string()));
                }
            };

            info!(
                "Uploaded {} ({} bytes) as {}",
                scan.file_name, blob.size, scan.file_id
            );
            self.events.send(ScanEvent::new(ScanEventKind::Created, &scan));

            if let Err(e) = self.trigger_extraction(&scan.file_id).await {
                warn!("Could not schedule extraction for {}: {}", scan.file_id, e);
            }

            Ok(scan)
        }
        .instrument(span)
        .await
    }

    /// Envelope form of [`ScanService::upload`].
    pub async fn upload_pdf(&self, caller: Option<&Caller>, file: Option<UploadedFile>) -> UploadResult {
        self.upload(caller, file).await.into()
    }

    async fn store_blob(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> std::result::Result<BlobMetadata, StorageError> {
        let target = self.store.generate_upload_url().await?;
        self.store.put(&target.ticket, content_type, file_name, bytes).await
    }

    /// Mints a one-time upload URL for clients that upload directly.
    pub async fn generate_upload_url(&self, caller: Option<&Caller>) -> Result<UploadTarget> {
        caller.ok_or(ScanError::AuthenticationRequired)?;
        Ok(self.store.generate_upload_url().await?)
    }

    /// Stores a file sent to a one-time upload URL. Only the blob is
    /// written; the client records the scan by triggering extraction.
    pub async fn put_direct(&self, ticket: &str, file: UploadedFile) -> Result<BlobMetadata> {
        let file_name = self.rules.check(&file)?;
        Ok(self
            .store
            .put(ticket, declared_type(&file, file_name), file_name, &file.bytes)
            .await?)
    }

    /// Returns a stored blob with its metadata.
    pub async fn read_blob(&self, file_id: &str) -> Result<(BlobMetadata, Vec<u8>)> {
        let not_found = || ScanError::NotFound("File not found".to_string());
        let metadata = self.store.metadata(file_id).await?.ok_or_else(not_found)?;
        let bytes = self.store.get(file_id).await.map_err(|e| match e {
            StorageError::NotFound(_) => not_found(),
            other => other.into(),
        })?;
        Ok((metadata, bytes))
    }

    /// URL the stored file can be fetched from.
    pub async fn download_url(&self, file_id: &str) -> Result<String> {
        self.store
            .get_url(file_id)
            .await?
            .ok_or_else(|| ScanError::NotFound(MSG_NO_DOWNLOAD_URL.to_string()))
    }

    /// Envelope form of [`ScanService::download_url`].
    pub async fn get_download_url(&self, file_id: &str) -> DownloadResult {
        self.download_url(file_id).await.into()
    }

    /// Starts extraction for a file and returns the scan id.
    ///
    /// Creates the scan if none exists, provided the blob does. A scan that
    /// is already `processing` or `done` is left alone.
    pub async fn trigger_extraction(&self, file_id: &str) -> Result<String> {
        let outcome = match scan_repo::begin_processing(&self.db, file_id, Utc::now())? {
            TriggerOutcome::Missing => {
                let metadata = self
                    .store
                    .metadata(file_id)
                    .await?
                    .ok_or_else(|| ScanError::NotFound(MSG_BLOB_NOT_FOUND.to_string()))?;
                let new_scan = NewScan {
                    file_id: file_id.to_string(),
                    file_name: metadata.file_name,
                    file_size: Some(metadata.size),
                    mime_type: Some(metadata.content_type),
                    user_id: None,
                    status: ScanStatus::Processing,
                };
                let outcome = scan_repo::insert_processing(&self.db, &new_scan, Utc::now())?;
                if let TriggerOutcome::Started(scan) = &outcome {
                    self.events.send(ScanEvent::new(ScanEventKind::Created, scan));
                }
                outcome
            }
            other => other,
        };

        match outcome {
            TriggerOutcome::Started(scan) => {
                self.schedule(&scan)?;
                Ok(scan.id)
            }
            TriggerOutcome::AlreadyActive(scan) => {
                info!(
                    "Extraction for {} already {}, nothing to do",
                    file_id, scan.status
                );
                Ok(scan.id)
            }
            TriggerOutcome::Missing => Err(ScanError::NotFound(MSG_SCAN_NOT_FOUND.to_string())),
        }
    }

    /// Resets a finished scan to `processing` and schedules a new attempt.
    pub async fn retry_scan(&self, file_id: &str) -> Result<ScanRecord> {
        match scan_repo::reset_for_retry(&self.db, file_id, Utc::now())? {
            RetryOutcome::Missing => Err(ScanError::NotFound(MSG_SCAN_NOT_FOUND.to_string())),
            RetryOutcome::InProgress => Err(ScanError::AlreadyInProgress),
            RetryOutcome::Reset(scan) => {
                info!("Retrying extraction for {}", scan.file_name);
                self.schedule(&scan)?;
                Ok(scan)
            }
        }
    }

    /// Queues again every scan a previous run left `processing`. Jobs keep
    /// the stored generation, so an attempt that did finish is not redone.
    pub fn resume_interrupted(&self) -> Result<usize> {
        let scans = scan_repo::list_processing(&self.db)?;
        for scan in &scans {
            self.schedule(scan)?;
        }
        if !scans.is_empty() {
            info!("Resumed {} interrupted extraction(s)", scans.len());
        }
        Ok(scans.len())
    }

    /// Queues the current attempt. If the queue is gone the attempt is
    /// recorded as failed so the scan does not stay `processing`.
    fn schedule(&self, scan: &ScanRecord) -> Result<()> {
        self.events
            .send(ScanEvent::new(ScanEventKind::Processing, scan));

        let job = ExtractionJob {
            scan_id: scan.id.clone(),
            file_id: scan.file_id.clone(),
            generation: scan.generation,
        };
        if let Err(e) = self.queue.submit(job) {
            let message = e.to_string();
            if scan_repo::fail(&self.db, &scan.id, scan.generation, &message, Utc::now())? {
                self.events.send(ScanEvent::failed(scan, &message));
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Most recent scans first. `limit` defaults to 50 and is capped at 100.
    pub fn list_scans(&self, limit: Option<u64>, status: Option<ScanStatus>) -> Result<Vec<ScanRecord>> {
        let filter = ScanFilter {
            status,
            limit: clamp_limit(limit),
            offset: 0,
        };
        Ok(scan_repo::list(&self.db, &filter)?)
    }

    /// One page of scans, most recent first.
    pub fn list_scans_page(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        status: Option<ScanStatus>,
    ) -> Result<ScanPage> {
        let limit = clamp_limit(limit);
        let offset = offset.unwrap_or(0);
        let window = offset.saturating_add(limit).saturating_add(1);

        let rows = scan_repo::list(
            &self.db,
            &ScanFilter {
                status,
                limit: window,
                offset: 0,
            },
        )?;

        let scanned = rows.len() as u64;
        let end = offset.saturating_add(limit);
        let results = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(ScanPage {
            results,
            has_more: scanned > end,
            scanned,
        })
    }

    /// The scan for a stored file, if any.
    pub fn get_scan(&self, file_id: &str) -> Result<Option<ScanRecord>> {
        Ok(scan_repo::find_by_file_id(&self.db, file_id)?)
    }

    pub fn get_scan_by_id(&self, id: &str) -> Result<Option<ScanRecord>> {
        Ok(scan_repo::find_by_id(&self.db, id)?)
    }

    /// Deletes a scan and, best effort, its blob.
    pub async fn delete_scan(&self, id: &str) -> Result<DeleteResult> {
        let scan = scan_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| ScanError::NotFound(MSG_SCAN_NOT_FOUND.to_string()))?;
        self.delete(scan).await
    }

    pub async fn delete_scan_by_file(&self, file_id: &str) -> Result<DeleteResult> {
        let deleted = scan_repo::delete_by_file_id(&self.db, file_id)?
            .ok_or_else(|| ScanError::NotFound(MSG_SCAN_NOT_FOUND.to_string()))?;
        self.remove_blob(file_id).await;
        Ok(self.deleted(deleted))
    }

    async fn delete(&self, scan: ScanRecord) -> Result<DeleteResult> {
        self.remove_blob(&scan.file_id).await;
        let deleted = scan_repo::delete_by_id(&self.db, &scan.id)?
            .ok_or_else(|| ScanError::NotFound(MSG_SCAN_NOT_FOUND.to_string()))?;
        Ok(self.deleted(deleted))
    }

    async fn remove_blob(&self, file_id: &str) {
        if let Err(e) = self.store.delete(file_id).await {
            warn!("Could not delete blob {}: {}", file_id, e);
        }
    }

    fn deleted(&self, deleted: ScanRecord) -> DeleteResult {
        info!("Deleted scan {} ({})", deleted.id, deleted.file_name);
        self.events
            .send(ScanEvent::new(ScanEventKind::Deleted, &deleted));

        DeleteResult {
            success: true,
            message: format!("Deleted {}", deleted.file_name),
            deleted_id: deleted.id,
        }
    }

    pub fn get_stats(&self) -> Result<ScanStats> {
        Ok(stats_repo::scan_stats(&self.db, STATS_SAMPLE_LIMIT)?)
    }
}

/// The type the client sent, else one guessed from the name, else PDF.
fn declared_type<'a>(file: &'a UploadedFile, file_name: &'a str) -> &'a str {
    file.content_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| mime_guess::from_path(file_name).first_raw())
        .unwrap_or(PDF_MIME_TYPE)
}

fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, bytes: usize) -> UploadedFile {
        UploadedFile {
            file_name: Some(name.to_string()),
            content_type: Some(PDF_MIME_TYPE.to_string()),
            bytes: vec![b'x'; bytes],
        }
    }

    #[test]
    fn test_is_pdf_by_type_or_extension() {
        let rules = UploadRules::default();
        assert!(rules.is_pdf("scan.bin", Some("application/pdf")));
        assert!(rules.is_pdf("scan.bin", Some("Application/PDF; charset=binary")));
        assert!(rules.is_pdf("SCAN.PDF", None));
        assert!(rules.is_pdf("scan.pdf", Some("application/octet-stream")));
        assert!(!rules.is_pdf("notes.txt", Some("text/plain")));
        assert!(!rules.is_pdf("pdf", None));
    }

    #[test]
    fn test_check_messages() {
        let rules = UploadRules::default();

        let err = rules.check(&UploadedFile::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid or missing file");

        let mut txt = pdf("notes.txt", 10);
        txt.content_type = Some("text/plain".into());
        assert_eq!(rules.check(&txt).unwrap_err().to_string(), "Only PDF files are allowed");

        let empty = pdf("empty.pdf", 0);
        assert_eq!(rules.check(&empty).unwrap_err().to_string(), "Invalid or missing file");

        let big = pdf("big.pdf", 1024 * 1024 + 1);
        assert_eq!(
            rules.check(&big).unwrap_err().to_string(),
            "File exceeds the maximum size of 1048576 bytes"
        );
    }

    #[test]
    fn test_check_accepts_boundaries() {
        let rules = UploadRules::default();
        assert_eq!(rules.check(&pdf("sample.pdf", 614400)).unwrap(), "sample.pdf");
        assert!(rules.check(&pdf("max.pdf", 1024 * 1024)).is_ok());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(150)), 100);
        assert_eq!(clamp_limit(Some(7)), 7);
    }

    #[test]
    fn test_download_result_envelope() {
        let ok: DownloadResult = Ok("http://x/api/storage/1".to_string()).into();
        assert!(ok.success);
        let failed: DownloadResult = Err(ScanError::NotFound("gone".into())).into();
        assert_eq!(failed.error.as_deref(), Some("Could not generate download URL"));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["downloadUrl"], "http://x/api/storage/1");
    }

    #[test]
    fn test_upload_result_error_envelope() {
        let result = UploadResult::err(&ScanError::AuthenticationRequired);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Not authenticated");
        assert!(json.get("scan").is_none());
    }
}
