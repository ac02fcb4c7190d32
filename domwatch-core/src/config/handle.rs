use std::sync::Arc;

use tokio::sync::watch;

use super::AppConfig;

/// Shared, copy-on-write access to the active [`AppConfig`].
///
/// Readers clone an `Arc` to the current snapshot and never observe a
/// partially updated value. Publishing swaps the whole `Arc`.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<AppConfig>>>,
}

impl ConfigHandle {
    pub fn new(initial: AppConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<AppConfig> {
        self.tx.borrow().clone()
    }

    /// Replaces the active snapshot, returning the one it displaced.
    pub fn publish(&self, next: AppConfig) -> Arc<AppConfig> {
        self.tx.send_replace(Arc::new(next))
    }

    /// Receiver that wakes whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.tx.subscribe()
    }
}
