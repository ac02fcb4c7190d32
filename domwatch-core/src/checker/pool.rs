use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::error::DomwatchError;
use crate::metrics::MetricsStore;
use crate::retry::RetryPolicy;
use crate::whois::WhoisProbe;

/// How long a cycle waits for its checks before abandoning the rest.
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Probes still running when the cycle timed out.
    pub abandoned: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// Another cycle was already in progress.
    Skipped,
    /// No domains configured.
    Empty,
}

/// Clears the busy flag on every exit path.
struct CycleGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Permits shared by every cycle. Probes left running or queued by a
/// timed-out cycle keep counting against the limit of the next one.
struct WorkerLimit {
    workers: usize,
    semaphore: Arc<Semaphore>,
}

/// Runs one bounded fan-out of WHOIS checks over the configured domains.
pub struct CheckerPool {
    probe: Arc<WhoisProbe>,
    store: Arc<MetricsStore>,
    config: ConfigHandle,
    concurrency_override: Option<usize>,
    cycle_timeout: Duration,
    busy: AtomicBool,
    limit: Mutex<Option<WorkerLimit>>,
}

impl CheckerPool {
    pub fn new(probe: Arc<WhoisProbe>, store: Arc<MetricsStore>, config: ConfigHandle) -> Self {
        Self {
            probe,
            store,
            config,
            concurrency_override: None,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            busy: AtomicBool::new(false),
            limit: Mutex::new(None),
        }
    }

    /// Worker count to use instead of `max_concurrent_checks`.
    pub fn with_concurrency_override(mut self, workers: Option<usize>) -> Self {
        self.concurrency_override = workers.map(|w| w.max(1));
        self
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The shared semaphore, replaced when the worker count changes.
    /// Probes already holding or awaiting the old one finish under it.
    fn permits(&self, workers: usize) -> Arc<Semaphore> {
        let mut limit = match self.limit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Worker limit lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Some(current) = limit.as_ref().filter(|l| l.workers == workers) {
            return current.semaphore.clone();
        }
        if limit.is_some() {
            info!(workers, "Worker limit changed");
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        *limit = Some(WorkerLimit {
            workers,
            semaphore: semaphore.clone(),
        });
        semaphore
    }

    /// Checks every configured domain once.
    ///
    /// Returns [`CycleOutcome::Skipped`] without doing anything if a cycle is
    /// already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.busy) else {
            debug!("Check cycle already in progress, skipping");
            return CycleOutcome::Skipped;
        };

        let config = self.config.current();
        let reconciled = self.store.reconcile(&config.domains);
        if !reconciled.added.is_empty() || !reconciled.removed.is_empty() {
            debug!(
                added = reconciled.added.len(),
                removed = reconciled.removed.len(),
                "Reconciled metrics with configuration"
            );
        }

        if config.domains.is_empty() {
            info!("No domains configured, skipping check cycle");
            return CycleOutcome::Empty;
        }

        let started = Instant::now();
        let total = config.domains.len();
        let workers = self
            .concurrency_override
            .unwrap_or(config.max_concurrent_checks)
            .max(1);
        let policy = RetryPolicy::fixed(config.whois_retry_times, config.whois_retry_interval());

        let semaphore = self.permits(workers);
        let succeeded = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        info!(total, workers, "Starting check cycle");

        let handles: Vec<_> = config
            .domains
            .iter()
            .cloned()
            .map(|domain| {
                let semaphore = semaphore.clone();
                let probe = self.probe.clone();
                let store = self.store.clone();
                let succeeded = succeeded.clone();
                let failed = failed.clone();
                let policy = policy.clone();

                tokio::spawn(async move {
                    // The semaphore is never closed.
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };

                    let result = probe.check(&domain, &policy).await;
                    if result.is_success() {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    } else {
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                    if !store.record_if_tracked(result) {
                        debug!(domain = %domain, "Domain removed while probing, result dropped");
                    }
                })
            })
            .collect();

        // Dropping the handles on timeout detaches the tasks; running and
        // queued checks still record their results.
        match tokio::time::timeout(self.cycle_timeout, join_all(handles)).await {
            Ok(joined) => {
                for (domain, outcome) in config.domains.iter().zip(joined) {
                    if let Err(e) = outcome {
                        let err = DomwatchError::Cycle(format!("check task for {} failed: {}", domain, e));
                        warn!(error = %err, "Check task did not complete");
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.cycle_timeout.as_secs(),
                    "Check cycle timed out, unfinished checks continue in the background"
                );
            }
        }

        let succeeded = succeeded.load(Ordering::SeqCst);
        let failed = failed.load(Ordering::SeqCst);
        let summary = CycleSummary {
            total,
            succeeded,
            failed,
            abandoned: total.saturating_sub(succeeded + failed),
            elapsed: started.elapsed(),
        };

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            abandoned = summary.abandoned,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Check cycle complete"
        );

        CycleOutcome::Completed(summary)
    }
}
