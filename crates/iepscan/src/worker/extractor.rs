//! The extraction pipeline for a single job.
//!
//! load blob → extract text → (optional) structured fields → persist.
//! Every write is guarded by the job's generation: if the scan was retried,
//! deleted or finished meanwhile, the result is dropped.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use tracing::Instrument;

use super::job::ExtractionJob;
use crate::broadcast::{ScanEvent, ScanEventBroadcaster};
use crate::db::{scan_repo, Database};
use crate::error::{StorageError, WorkerError};
use crate::extraction::{accept_text, FieldExtractor, TextExtractor};
use crate::iep::IepFields;
use crate::scan::{ScanRecord, ScanStatus};
use crate::storage::ObjectStore;

/// Uploads are validated as PDFs whatever type the client declared.
const PDF_MIME_TYPE: &str = "application/pdf";

/// How a job ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Text stored; value is its length in characters.
    Completed { chars: usize },
    /// The scan moved on; nothing was written.
    Stale,
}

/// Runs extraction jobs against injected collaborators.
#[derive(Clone)]
pub struct ExtractionWorker {
    db: Database,
    store: Arc<dyn ObjectStore>,
    text: Arc<dyn TextExtractor>,
    fields: Option<Arc<dyn FieldExtractor>>,
    events: ScanEventBroadcaster,
}

impl ExtractionWorker {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        text: Arc<dyn TextExtractor>,
        events: ScanEventBroadcaster,
    ) -> Self {
        Self {
            db,
            store,
            text,
            fields: None,
            events,
        }
    }

    /// Enables the structured-field stage.
    pub fn with_field_extractor(mut self, fields: Arc<dyn FieldExtractor>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Processes one job. A failed attempt is recorded on the scan before
    /// the error is returned.
    pub async fn process(&self, job: ExtractionJob) -> Result<ExtractionOutcome, WorkerError> {
        let span = tracing::info_span!(
            "extraction",
            scan_id = %job.scan_id,
            file_id = %job.file_id,
            generation = job.generation
        );
        self.run(job).instrument(span).await
    }

    async fn run(&self, job: ExtractionJob) -> Result<ExtractionOutcome, WorkerError> {
        let scan = match scan_repo::find_by_id(&self.db, &job.scan_id) {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                warn!("Scan {} no longer exists, dropping job", job.scan_id);
                return Ok(ExtractionOutcome::Stale);
            }
            Err(source) => {
                return Err(WorkerError::Persist {
                    scan_id: job.scan_id,
                    source,
                })
            }
        };

        if scan.generation != job.generation || scan.status != ScanStatus::Processing {
            warn!(
                "Scan {} is at generation {} ({}), dropping job for generation {}",
                scan.id, scan.generation, scan.status, job.generation
            );
            return Ok(ExtractionOutcome::Stale);
        }

        match self.extract(&scan).await {
            Ok((text, fields)) => self.finish(&job, &scan, &text, fields.as_ref()),
            Err(message) => self.record_failure(&job, &scan, message),
        }
    }

    async fn extract(&self, scan: &ScanRecord) -> Result<(String, Option<IepFields>), String> {
        let document = self.store.get(&scan.file_id).await.map_err(|e| match e {
            StorageError::NotFound(_) => "File not found in storage".to_string(),
            other => other.to_string(),
        })?;

        let output = self
            .text
            .extract_text(&document, PDF_MIME_TYPE)
            .instrument(tracing::info_span!("extract_text", bytes = document.len()))
            .await
            .map_err(|e| e.to_string())?;
        let text = accept_text(&output).map_err(|e| e.to_string())?;

        let fields = match &self.fields {
            Some(extractor) => match extractor
                .extract_fields(&text)
                .instrument(tracing::info_span!("extract_fields"))
                .await
            {
                Ok(fields) if !fields.is_empty() => Some(fields),
                Ok(_) => None,
                Err(e) => {
                    warn!("Structured field extraction failed for {}: {}", scan.id, e);
                    None
                }
            },
            None => None,
        };

        Ok((text, fields))
    }

    fn finish(
        &self,
        job: &ExtractionJob,
        scan: &ScanRecord,
        text: &str,
        fields: Option<&IepFields>,
    ) -> Result<ExtractionOutcome, WorkerError> {
        let applied = scan_repo::complete(&self.db, &scan.id, job.generation, text, fields, Utc::now())
            .map_err(|source| WorkerError::Persist {
                scan_id: scan.id.clone(),
                source,
            })?;

        if !applied {
            warn!("Discarding stale result for scan {}", scan.id);
            return Ok(ExtractionOutcome::Stale);
        }

        let chars = text.chars().count();
        info!("Extracted {} characters from {}", chars, scan.file_name);
        self.events.send(ScanEvent::completed(scan));
        Ok(ExtractionOutcome::Completed { chars })
    }

    fn record_failure(
        &self,
        job: &ExtractionJob,
        scan: &ScanRecord,
        message: String,
    ) -> Result<ExtractionOutcome, WorkerError> {
        let applied = scan_repo::fail(&self.db, &scan.id, job.generation, &message, Utc::now())
            .map_err(|source| WorkerError::Persist {
                scan_id: scan.id.clone(),
                source,
            })?;

        if applied {
            self.events.send(ScanEvent::failed(scan, &message));
        } else {
            warn!("Discarding stale failure for scan {}", scan.id);
        }

        Err(WorkerError::Extraction {
            scan_id: scan.id.clone(),
            message,
        })
    }
}
