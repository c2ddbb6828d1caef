use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::extractor::{ExtractionOutcome, ExtractionWorker};
use super::job::ExtractionReceiver;

/// A fixed number of tokio tasks draining the extraction queue.
///
/// Shutdown stops workers from taking new jobs; a job already running is
/// allowed to finish.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn spawn(worker: ExtractionWorker, receiver: ExtractionReceiver, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    worker.clone(),
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!("Started {} extraction workers", worker_count);
        Self { workers, shutdown }
    }

    pub fn shutdown(&self) {
        info!("Shutting down extraction workers...");
        let _ = self.shutdown.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Waits for every worker to exit.
    pub async fn wait(self) {
        for (i, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Extraction worker {} panicked: {}", i, e);
            } else {
                debug!("Extraction worker {} finished", i);
            }
        }
        info!("All extraction workers have stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    worker: ExtractionWorker,
    receiver: Arc<Mutex<ExtractionReceiver>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Extraction worker {} started", worker_id);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            job = async { receiver.lock().await.recv().await } => job,
        };

        let Some(job) = job else {
            debug!("Extraction worker {}: queue closed", worker_id);
            break;
        };

        match worker.process(job).await {
            Ok(ExtractionOutcome::Completed { chars }) => {
                debug!("Worker {} finished job ({} chars)", worker_id, chars)
            }
            Ok(ExtractionOutcome::Stale) => {}
            Err(e) => error!("{}", e),
        }
    }

    debug!("Extraction worker {} stopped", worker_id);
}
