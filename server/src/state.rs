//! Shared state handed to every request handler.

use std::sync::Arc;

use tokio::sync::watch;

use iepscan::config::ResolvedToken;
use iepscan::secrets::token_matches;
use iepscan::service::{Caller, ScanService};

/// Application state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub service: ScanService,
    tokens: Arc<Vec<ResolvedToken>>,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(service: ScanService, tokens: Vec<ResolvedToken>) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self {
            service,
            tokens: Arc::new(tokens),
            shutdown,
        }
    }

    /// Long-lived responses end once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// The user a bearer token belongs to, if any.
    pub fn authenticate(&self, presented: &str) -> Option<Caller> {
        self.tokens
            .iter()
            .find(|entry| token_matches(&entry.token, presented))
            .map(|entry| Caller {
                user_id: entry.user_id.clone(),
            })
    }
}
