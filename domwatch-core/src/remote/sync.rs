//! Keeps the active configuration in step with the remote store.
//!
//! Each poll fetches the document and compares its MD5 digest with the
//! digest of the snapshot currently in effect. Only a changed, valid
//! document is published; an invalid one leaves the previous snapshot
//! untouched.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::client::ConfigStoreClient;
use crate::config::{content_digest, AppConfig, ConfigHandle};
use crate::error::{DomwatchError, Result};
use crate::shutdown::ShutdownListener;

/// How long startup waits for the first remote snapshot.
pub const INITIAL_SYNC_WINDOW: Duration = Duration::from_secs(30);
const INITIAL_SYNC_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Floor for the wait after a failed poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

pub type ChangeCallback = Box<dyn Fn(&AppConfig) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Same digest as the active snapshot.
    Unchanged,
    Applied,
    /// Blank document, ignored.
    Empty,
}

pub struct ConfigSynchronizer {
    client: ConfigStoreClient,
    config: ConfigHandle,
    callbacks: Vec<ChangeCallback>,
    initial_window: Duration,
    initial_retry_delay: Duration,
}

impl ConfigSynchronizer {
    pub fn new(client: ConfigStoreClient, config: ConfigHandle) -> Self {
        Self {
            client,
            config,
            callbacks: Vec::new(),
            initial_window: INITIAL_SYNC_WINDOW,
            initial_retry_delay: INITIAL_SYNC_RETRY_DELAY,
        }
    }

    pub fn with_initial_window(mut self, window: Duration, retry_delay: Duration) -> Self {
        self.initial_window = window;
        self.initial_retry_delay = retry_delay;
        self
    }

    /// Registers a callback invoked with every newly applied snapshot.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: Fn(&AppConfig) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// One fetch-compare-apply round.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let payload = self.client.fetch().await?;
        self.apply_payload(&payload)
    }

    /// Applies `payload` if its digest differs from the active snapshot's.
    pub fn apply_payload(&self, payload: &str) -> Result<SyncOutcome> {
        if payload.trim().is_empty() {
            warn!("Received empty configuration, ignoring");
            return Ok(SyncOutcome::Empty);
        }

        let digest = content_digest(payload.as_bytes());
        let current = self.config.current();
        if current.content_hash == digest {
            debug!(digest = %digest, "Configuration unchanged");
            return Ok(SyncOutcome::Unchanged);
        }

        let next = match AppConfig::from_payload(payload, &current) {
            Ok(next) => next,
            Err(e) => {
                warn!(digest = %digest, error = %e, "Rejected configuration update");
                return Err(e);
            }
        };

        if next.metrics_port != current.metrics_port {
            warn!(
                old_port = current.metrics_port,
                new_port = next.metrics_port,
                "metrics_port changed, takes effect after restart"
            );
        }

        self.config.publish(next);
        let applied = self.config.current();
        info!(
            digest = %digest,
            domains = applied.domains.len(),
            check_interval = applied.check_interval_seconds,
            max_concurrent = applied.max_concurrent_checks,
            "Configuration applied"
        );

        for callback in &self.callbacks {
            callback(&applied);
        }

        Ok(SyncOutcome::Applied)
    }

    /// Tries to obtain a first snapshot, retrying fetch failures until the
    /// initial window closes.
    ///
    /// An invalid first document or rejected credentials are returned as
    /// errors. Running out of time is not: startup continues on defaults and
    /// the poll loop keeps trying.
    pub async fn initial_sync(&self) -> Result<()> {
        let deadline = Instant::now() + self.initial_window;

        loop {
            let failure = match self.sync_once().await {
                Ok(SyncOutcome::Empty) => "empty configuration".to_string(),
                Ok(_) => return Ok(()),
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => e.to_string(),
            };

            if Instant::now() + self.initial_retry_delay > deadline {
                warn!(
                    window_secs = self.initial_window.as_secs(),
                    last_error = %failure,
                    "No remote configuration within startup window, continuing with defaults"
                );
                return Ok(());
            }

            debug!(error = %failure, "Waiting for initial configuration");
            tokio::time::sleep(self.initial_retry_delay).await;
        }
    }

    /// Polls until shutdown is requested. The interval is re-read from the
    /// active snapshot before every wait.
    pub async fn run(&self, mut shutdown: ShutdownListener) {
        info!(
            data_id = %self.client.settings().data_id,
            group = %self.client.settings().group,
            "Configuration listener started"
        );

        let mut wait = self.config.current().poll_interval();
        loop {
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let poll_interval = self.config.current().poll_interval();
            let outcome = tokio::select! {
                _ = shutdown.requested() => break,
                outcome = self.sync_once() => outcome,
            };

            wait = match outcome {
                Ok(_) => self.config.current().poll_interval(),
                Err(e @ DomwatchError::ConfigParse(_)) | Err(e @ DomwatchError::ConfigValidation(_)) => {
                    debug!(error = %e, "Keeping previous configuration");
                    poll_interval
                }
                Err(e) => {
                    error!(error = %e, "Configuration update error");
                    poll_interval.max(ERROR_BACKOFF)
                }
            };
        }

        info!("Configuration listener stopped");
    }
}

fn is_fatal(error: &DomwatchError) -> bool {
    matches!(
        error,
        DomwatchError::ConfigParse(_)
            | DomwatchError::ConfigValidation(_)
            | DomwatchError::Authentication(_)
    )
}
