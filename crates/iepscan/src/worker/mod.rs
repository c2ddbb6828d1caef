pub mod extractor;
pub mod job;
pub mod pool;

pub use extractor::{ExtractionOutcome, ExtractionWorker};
pub use job::{ExtractionJob, ExtractionQueue, ExtractionReceiver};
pub use pool::WorkerPool;
