use tokio::sync::mpsc;

use crate::error::WorkerError;

/// One extraction attempt for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub scan_id: String,
    pub file_id: String,
    /// Generation the scan had when the attempt was scheduled.
    pub generation: u32,
}

pub type ExtractionReceiver = mpsc::UnboundedReceiver<ExtractionJob>;

/// Sending half of the extraction queue. Cheap to clone.
#[derive(Clone)]
pub struct ExtractionQueue {
    sender: mpsc::UnboundedSender<ExtractionJob>,
}

impl ExtractionQueue {
    pub fn channel() -> (Self, ExtractionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn submit(&self, job: ExtractionJob) -> Result<(), WorkerError> {
        log::debug!(
            "Queued extraction for scan {} (generation {})",
            job.scan_id,
            job.generation
        );
        self.sender.send(job).map_err(|_| WorkerError::QueueClosed)
    }
}
