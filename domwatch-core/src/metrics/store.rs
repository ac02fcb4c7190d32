//! Latest check result per domain.
//!
//! Workers write concurrently while the exporter reads; every read hands out
//! an owned copy so rendering never holds the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::result::{CheckResult, CheckStatus};

/// Point-in-time copy of the store, keyed by domain.
pub type MetricsSnapshot = HashMap<String, CheckResult>;

/// What a [`MetricsStore::reconcile`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Counts over the current results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub pending: usize,
    pub critical: usize,
}

#[derive(Debug, Default)]
pub struct MetricsStore {
    results: RwLock<HashMap<String, CheckResult>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CheckResult>> {
        match self.results.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Metrics store read lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CheckResult>> {
        match self.results.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Metrics store write lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replaces the entry for `result.domain`.
    pub fn record(&self, result: CheckResult) {
        self.write().insert(result.domain.clone(), result);
    }

    /// Replaces the entry only if the domain is still tracked. Returns
    /// whether the result was stored.
    ///
    /// Probes write through this so a result that lands after its domain was
    /// removed from the configuration cannot bring the domain back.
    pub fn record_if_tracked(&self, result: CheckResult) -> bool {
        let mut results = self.write();
        match results.get_mut(&result.domain) {
            Some(slot) => {
                *slot = result;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, domain: &str) -> Option<CheckResult> {
        self.read().get(domain).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every entry whose domain is not in `active`. Returns the removed domains.
    pub fn prune(&self, active: &[String]) -> Vec<String> {
        let keep: HashSet<&str> = active.iter().map(String::as_str).collect();
        let mut results = self.write();

        let removed: Vec<String> = results
            .keys()
            .filter(|domain| !keep.contains(domain.as_str()))
            .cloned()
            .collect();
        for domain in &removed {
            results.remove(domain);
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), "Pruned removed domains from metrics");
        }
        removed
    }

    /// Prunes domains no longer in `active` and inserts a `Pending` entry for
    /// each new one. Existing results are left alone.
    pub fn reconcile(&self, active: &[String]) -> Reconciled {
        let removed = self.prune(active);
        let mut results = self.write();

        let mut added = Vec::new();
        for domain in active {
            if !results.contains_key(domain) {
                results.insert(domain.clone(), CheckResult::pending(domain.as_str()));
                added.push(domain.clone());
            }
        }

        Reconciled { added, removed }
    }

    pub fn summary(&self, threshold_days: i64) -> StoreSummary {
        let results = self.read();
        let mut summary = StoreSummary {
            total: results.len(),
            ..StoreSummary::default()
        };

        for result in results.values() {
            match result.status {
                CheckStatus::Success => summary.success += 1,
                CheckStatus::Error => summary.error += 1,
                CheckStatus::Pending => summary.pending += 1,
            }
            if result.is_critical(threshold_days) {
                summary.critical += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_record_replaces() {
        let store = MetricsStore::new();
        store.record(CheckResult::error("a.com", "timeout"));
        store.record(CheckResult::success("a.com", Utc::now(), 40));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a.com").unwrap().days_until_expiry, Some(40));
    }

    #[test]
    fn test_prune_removes_inactive() {
        let store = MetricsStore::new();
        store.record(CheckResult::success("a.com", Utc::now(), 40));
        store.record(CheckResult::success("b.com", Utc::now(), 40));

        let removed = store.prune(&domains(&["a.com"]));

        assert_eq!(removed, vec!["b.com".to_string()]);
        assert!(store.get("b.com").is_none());
        assert!(store.get("a.com").is_some());
    }

    #[test]
    fn test_reconcile_adds_pending_and_keeps_existing() {
        let store = MetricsStore::new();
        store.record(CheckResult::success("a.com", Utc::now(), 40));
        store.record(CheckResult::error("old.com", "boom"));

        let change = store.reconcile(&domains(&["a.com", "new.com"]));

        assert_eq!(change.added, vec!["new.com".to_string()]);
        assert_eq!(change.removed, vec!["old.com".to_string()]);
        assert!(store.get("a.com").unwrap().is_success());
        assert!(store.get("new.com").unwrap().is_pending());
    }

    #[test]
    fn test_record_if_tracked_skips_removed_domains() {
        let store = MetricsStore::new();
        store.reconcile(&domains(&["a.com"]));

        assert!(store.record_if_tracked(CheckResult::success("a.com", Utc::now(), 40)));
        assert!(!store.record_if_tracked(CheckResult::success("gone.com", Utc::now(), 40)));

        assert!(store.get("a.com").unwrap().is_success());
        assert!(store.get("gone.com").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_summary_counts() {
        let store = MetricsStore::new();
        store.record(CheckResult::success("a.com", Utc::now(), 10));
        store.record(CheckResult::success("b.com", Utc::now(), 400));
        store.record(CheckResult::error("c.com", "boom"));
        store.record(CheckResult::pending("d.com"));

        let summary = store.summary(15);
        assert_eq!(
            summary,
            StoreSummary {
                total: 4,
                success: 2,
                error: 1,
                pending: 1,
                critical: 2,
            }
        );
    }

    #[test]
    fn test_concurrent_writers() {
        let store = std::sync::Arc::new(MetricsStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.record(CheckResult::success(format!("d{}-{}.com", i, j), Utc::now(), j));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
