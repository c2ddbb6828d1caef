mod auth;
mod error;
mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;

use iepscan::broadcast::ScanEventBroadcaster;
use iepscan::config::{load_config_or_default, Config};
use iepscan::db::{Database, DatabaseError};
use iepscan::error::{ConfigError, ExtractionError, ScanError, StorageError};
use iepscan::extraction::{FieldExtractor, GeminiClient, TextExtractor};
use iepscan::logging::{init_logging, LoggingError};
use iepscan::service::{ScanService, UploadRules};
use iepscan::storage::{LocalObjectStore, ObjectStore};
use iepscan::worker::{ExtractionQueue, ExtractionWorker, WorkerPool};

use state::AppState;

/// IEP scan service: PDF upload, storage and text extraction over HTTP.
#[derive(Parser, Debug)]
#[command(name = "iepscan-server", version, about)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, env = "IEPSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config.
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to open database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to open blob store: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to create extraction client: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Failed to resume interrupted scans: {0}")]
    Resume(#[source] ScanError),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = load_config_or_default(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging)?;
    info!("Starting iepscan-server v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state, pool) = build(&config)?;
    let app = routes::router(state.with_shutdown(shutdown_rx));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Listening on http://{} (public URL {})", addr, config.server.base_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(StartupError::Serve)?;

    pool.shutdown();
    pool.wait().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Wires the database, blob store, extraction client and worker pool.
fn build(config: &Config) -> Result<(AppState, WorkerPool), StartupError> {
    let db_path = config.database_path();
    info!("Using database {}", db_path.display());
    let db = Database::open(&db_path)?;

    let store = Arc::new(LocalObjectStore::new(
        config.storage_directory(),
        &config.server.base_url(),
        Duration::from_secs(config.storage.upload_url_ttl_secs),
    )?);

    let api_key = config.resolve_api_key()?;
    if api_key.is_none() {
        warn!("No extraction API key configured; every extraction will fail");
    }
    let gemini = Arc::new(GeminiClient::new(&config.extraction, api_key)?);

    let events = ScanEventBroadcaster::default();
    let (queue, receiver) = ExtractionQueue::channel();

    let mut worker = ExtractionWorker::new(
        db.clone(),
        store.clone() as Arc<dyn ObjectStore>,
        gemini.clone() as Arc<dyn TextExtractor>,
        events.clone(),
    );
    if config.extraction.structured_fields {
        worker = worker.with_field_extractor(gemini as Arc<dyn FieldExtractor>);
    }
    let pool = WorkerPool::spawn(worker, receiver, config.extraction.worker_count);

    let service = ScanService::new(
        db,
        store as Arc<dyn ObjectStore>,
        queue,
        events,
        UploadRules::from_config(&config.upload),
    );
    service.resume_interrupted().map_err(StartupError::Resume)?;

    let tokens = config.resolve_tokens()?;
    if tokens.is_empty() {
        warn!("No auth tokens configured; uploads will be rejected");
    }

    Ok((AppState::new(service, tokens), pool))
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
    info!("Shutdown signal received, draining requests");
}
