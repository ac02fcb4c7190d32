use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::pool::{CheckerPool, CycleOutcome};
use crate::config::{AppConfig, ConfigHandle};
use crate::metrics::{CheckStatus, MetricsStore};
use crate::shutdown::ShutdownListener;

/// Decides when check cycles run: once at startup, every
/// `check_interval_seconds`, and after each applied configuration change.
///
/// Changes that arrive while a cycle is running collapse into a single
/// follow-up cycle.
#[derive(Clone)]
pub struct Scheduler {
    pool: Arc<CheckerPool>,
    store: Arc<MetricsStore>,
    config: ConfigHandle,
    trigger: Arc<Notify>,
}

impl Scheduler {
    pub fn new(pool: Arc<CheckerPool>, store: Arc<MetricsStore>, config: ConfigHandle) -> Self {
        Self {
            pool,
            store,
            config,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Drops metrics for removed domains right away and requests a cycle.
    pub fn config_changed(&self, config: &AppConfig) {
        let removed = self.store.prune(&config.domains);
        if !removed.is_empty() {
            info!(removed = ?removed, "Domains removed from configuration");
        }
        self.trigger.notify_one();
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) {
        info!("Scheduler started");
        self.run_and_report().await;

        loop {
            if shutdown.is_requested() {
                break;
            }

            let interval = self.config.current().check_interval();
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = self.trigger.notified() => {
                    info!("Configuration changed, starting check cycle");
                }
                _ = tokio::time::sleep(interval) => {
                    debug!(interval_secs = interval.as_secs(), "Check interval elapsed");
                }
            }

            self.run_and_report().await;
        }

        info!("Scheduler stopped");
    }

    async fn run_and_report(&self) {
        match self.pool.run_cycle().await {
            CycleOutcome::Completed(_) => self.log_report(),
            CycleOutcome::Skipped => debug!("Cycle skipped, previous cycle still running"),
            CycleOutcome::Empty => {}
        }
    }

    /// One line per configured domain with its latest outcome.
    fn log_report(&self) {
        let config = self.config.current();
        let threshold = config.expire_threshold_days;

        for domain in &config.domains {
            let Some(result) = self.store.get(domain) else { continue };
            match result.status {
                CheckStatus::Success => {
                    let days = result.days_until_expiry.unwrap_or_default();
                    if result.is_critical(threshold) {
                        warn!(domain = %domain, days, threshold, "CRITICAL: {} expires in {} days", domain, days);
                    } else {
                        info!(domain = %domain, days, "OK: {} expires in {} days", domain, days);
                    }
                }
                CheckStatus::Error => {
                    let message = result.error_message.as_deref().unwrap_or("unknown error");
                    error!(domain = %domain, error = %message, "FAILED: {}", domain);
                }
                CheckStatus::Pending => {
                    debug!(domain = %domain, "PENDING: {} not checked yet", domain);
                }
            }
        }

        let summary = self.store.summary(threshold);
        info!(
            total = summary.total,
            ok = summary.success,
            failed = summary.error,
            pending = summary.pending,
            critical = summary.critical,
            "Check report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::test_support::StubSource;
    use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownSignal};
    use crate::whois::WhoisProbe;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn app_config(domains: &[&str]) -> AppConfig {
        AppConfig {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            whois_retry_times: 0,
            ..AppConfig::default()
        }
    }

    fn scheduler(source: Arc<StubSource>, handle: ConfigHandle, store: Arc<MetricsStore>) -> Scheduler {
        let probe = Arc::new(WhoisProbe::new(source));
        let pool = Arc::new(CheckerPool::new(probe, store.clone(), handle.clone()));
        Scheduler::new(pool, store, handle)
    }

    #[test]
    fn test_config_change_prunes_immediately() {
        let store = Arc::new(MetricsStore::new());
        store.record(crate::metrics::CheckResult::pending("a.com"));
        store.record(crate::metrics::CheckResult::pending("b.com"));
        let handle = ConfigHandle::new(app_config(&["a.com", "b.com"]));
        let scheduler = scheduler(Arc::new(StubSource::default()), handle, store.clone());

        scheduler.config_changed(&app_config(&["a.com"]));

        assert!(store.get("b.com").is_none());
        assert!(store.get("a.com").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_triggers_cycle_and_shutdown_stops() {
        let source = Arc::new(StubSource::default());
        let store = Arc::new(MetricsStore::new());
        let handle = ConfigHandle::new(app_config(&["a.com"]));
        let scheduler = scheduler(source.clone(), handle.clone(), store.clone());
        let coordinator = ShutdownCoordinator::new();

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            let listener = coordinator.listener();
            async move { scheduler.run(listener).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get("a.com").unwrap().is_success());

        let next = app_config(&["b.com"]);
        handle.publish(next.clone());
        scheduler.config_changed(&next);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(store.get("a.com").is_none());
        assert!(store.get("b.com").unwrap().is_success());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let (tx, rx) = mpsc::channel(1);
        tx.send(ShutdownSignal::Terminate).await.unwrap();
        let outcome = coordinator
            .run(rx, async move {
                let _ = task.await;
            })
            .await;
        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_lets_running_cycle_finish() {
        let source = Arc::new(StubSource {
            default_delay: Duration::from_secs(3),
            ..StubSource::default()
        });
        let store = Arc::new(MetricsStore::new());
        let handle = ConfigHandle::new(app_config(&["a.com"]));
        let scheduler = scheduler(source, handle, store.clone());
        let coordinator = ShutdownCoordinator::new();

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            let listener = coordinator.listener();
            async move { scheduler.run(listener).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get("a.com").unwrap().is_pending());

        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        let outcome = coordinator
            .run(rx, async move {
                let _ = task.await;
            })
            .await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert!(store.get("a.com").unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_interrupt_abandons_running_cycle() {
        let source = Arc::new(StubSource {
            default_delay: Duration::from_secs(10),
            ..StubSource::default()
        });
        let store = Arc::new(MetricsStore::new());
        let handle = ConfigHandle::new(app_config(&["a.com"]));
        let scheduler = scheduler(source, handle, store.clone());
        let coordinator = ShutdownCoordinator::new();

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            let listener = coordinator.listener();
            async move { scheduler.run(listener).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(ShutdownSignal::Interrupt).await;
        });

        let started = tokio::time::Instant::now();
        let outcome = coordinator
            .run(rx, async move {
                let _ = task.await;
            })
            .await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert_eq!(coordinator.state(), crate::shutdown::ShutdownState::ForceShutdown);
        assert!(started.elapsed() < crate::shutdown::DEFAULT_GRACE_PERIOD);
        assert!(store.get("a.com").unwrap().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_coalesce_into_one_cycle() {
        let source = Arc::new(StubSource {
            default_delay: Duration::from_secs(10),
            ..StubSource::default()
        });
        let store = Arc::new(MetricsStore::new());
        let handle = ConfigHandle::new(app_config(&["a.com"]));
        let scheduler = scheduler(source.clone(), handle.clone(), store);
        let coordinator = ShutdownCoordinator::new();

        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            let listener = coordinator.listener();
            async move { scheduler.run(listener).await }
        });

        // Three changes while the startup cycle is still probing.
        tokio::time::sleep(Duration::from_secs(1)).await;
        for _ in 0..3 {
            scheduler.config_changed(&app_config(&["a.com"]));
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        let (tx, rx) = mpsc::channel(1);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        let outcome = coordinator
            .run(rx, async move {
                let _ = task.await;
            })
            .await;
        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }
}
