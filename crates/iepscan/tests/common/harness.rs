//! Test harness for isolated service tests.
//!
//! `TestHarness` wires a `ScanService` to a SQLite file and a blob directory
//! inside a temp dir. Extraction jobs are not run automatically: they stay
//! in the queue until `run_queued_jobs` drains them through an
//! `ExtractionWorker` backed by the fake extractors.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use iepscan::broadcast::ScanEventBroadcaster;
use iepscan::config::UploadConfig;
use iepscan::db::Database;
use iepscan::error::WorkerError;
use iepscan::scan::ScanRecord;
use iepscan::service::{Caller, ScanService, UploadRules, UploadedFile};
use iepscan::storage::{LocalObjectStore, ObjectStore};
use iepscan::worker::{ExtractionJob, ExtractionOutcome, ExtractionQueue, ExtractionReceiver, ExtractionWorker};

use super::fakes::{FakeFieldExtractor, FakeTextExtractor, Reply};

pub const SAMPLE_TEXT: &str = "INDIVIDUALIZED EDUCATION PROGRAM\nStudent: Jordan Lee\nGrade: 4";

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub store: Arc<LocalObjectStore>,
    pub events: ScanEventBroadcaster,
    pub service: ScanService,
    pub text: Arc<FakeTextExtractor>,
    pub fields: Option<Arc<FakeFieldExtractor>>,
    queue: ExtractionQueue,
    receiver: ExtractionReceiver,
}

impl TestHarness {
    /// Harness whose text extractor always returns `SAMPLE_TEXT`.
    pub fn new() -> Self {
        Self::with_options(UploadConfig::default(), Reply::text(SAMPLE_TEXT))
    }

    pub fn with_text_reply(reply: Reply) -> Self {
        Self::with_options(UploadConfig::default(), reply)
    }

    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self::with_options(UploadConfig { max_file_size }, Reply::text(SAMPLE_TEXT))
    }

    pub fn with_options(upload: UploadConfig, reply: Reply) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::in_dir(temp_dir, upload, reply)
    }

    /// A fresh service over the same database and blobs, as after a
    /// restart. Anything still queued is lost.
    pub fn reopen(self) -> Self {
        let TestHarness { temp_dir, .. } = self;
        Self::in_dir(temp_dir, UploadConfig::default(), Reply::text(SAMPLE_TEXT))
    }

    fn in_dir(temp_dir: TempDir, upload: UploadConfig, reply: Reply) -> Self {
        let db = Database::open(&temp_dir.path().join("data").join("iepscan.db"))
            .expect("Failed to open database");
        let store = Arc::new(
            LocalObjectStore::new(
                temp_dir.path().join("blobs"),
                "http://localhost:8080",
                Duration::from_secs(60),
            )
            .expect("Failed to create blob store"),
        );
        let events = ScanEventBroadcaster::new(64);
        let (queue, receiver) = ExtractionQueue::channel();

        let service = ScanService::new(
            db.clone(),
            store.clone() as Arc<dyn ObjectStore>,
            queue.clone(),
            events.clone(),
            UploadRules::from_config(&upload),
        );

        Self {
            temp_dir,
            db,
            store,
            events,
            service,
            text: Arc::new(FakeTextExtractor::always(reply)),
            fields: None,
            queue,
            receiver,
        }
    }

    /// Enables the structured stage with the given fake.
    pub fn with_field_extractor(mut self, fields: FakeFieldExtractor) -> Self {
        self.fields = Some(Arc::new(fields));
        self
    }

    pub fn caller() -> Caller {
        Caller {
            user_id: "teacher-1".to_string(),
        }
    }

    pub fn pdf(name: &str, size: usize) -> UploadedFile {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(size.max(bytes.len()), b'0');
        bytes.truncate(size);
        UploadedFile {
            file_name: Some(name.to_string()),
            content_type: Some("application/pdf".to_string()),
            bytes,
        }
    }

    /// Uploads a PDF as the default caller, panicking on failure.
    pub async fn upload(&self, name: &str, size: usize) -> ScanRecord {
        self.service
            .upload(Some(&Self::caller()), Some(Self::pdf(name, size)))
            .await
            .expect("upload failed")
    }

    pub fn worker(&self) -> ExtractionWorker {
        let worker = ExtractionWorker::new(
            self.db.clone(),
            self.store.clone() as Arc<dyn ObjectStore>,
            self.text.clone(),
            self.events.clone(),
        );
        match &self.fields {
            Some(fields) => worker.with_field_extractor(fields.clone()),
            None => worker,
        }
    }

    /// Jobs currently waiting in the queue, removed from it.
    pub fn take_queued_jobs(&mut self) -> Vec<ExtractionJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.receiver.try_recv() {
            jobs.push(job);
        }
        jobs
    }

    /// Runs every queued job to completion, in order.
    pub async fn run_queued_jobs(&mut self) -> Vec<Result<ExtractionOutcome, WorkerError>> {
        let worker = self.worker();
        let mut results = Vec::new();
        for job in self.take_queued_jobs() {
            results.push(worker.process(job).await);
        }
        results
    }

    /// Hands the queue's receiving half to the caller, e.g. for a pool.
    pub fn into_receiver(self) -> (ScanService, ExtractionWorker, ExtractionReceiver, TempDir) {
        let worker = self.worker();
        (self.service, worker, self.receiver, self.temp_dir)
    }

    pub fn blob_count(&self) -> usize {
        std::fs::read_dir(self.store.directory())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "blob"))
                    .count()
            })
            .unwrap_or(0)
    }
}
