//! Centralized shutdown management

use std::sync::Arc;

use tokio::sync::watch;

use crate::data::postgres::PostgresService;

/// Coordinates graceful shutdown: the serve loop watches for the trigger,
/// drains in-flight requests, then the pool is closed. The sweepers run as
/// external one-shot commands, so there are no long-lived background tasks
/// to drain here.
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    database: Arc<PostgresService>,
}

impl ShutdownService {
    pub fn new(database: Arc<PostgresService>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            database,
        }
    }

    /// Subscribe to shutdown signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Trigger shutdown and release shared resources. Callers await the
    /// server's graceful drain before invoking this.
    pub async fn shutdown(&self) {
        tracing::debug!("Initiating graceful shutdown...");
        self.trigger();

        tracing::debug!("Closing database connections...");
        self.database.close().await;

        tracing::debug!("Shutdown complete");
    }
}
