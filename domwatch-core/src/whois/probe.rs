use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::client::{RawWhois, WhoisSource};
use super::decode::decode_response;
use super::extract::ExpiryExtractor;
use crate::error::{DomwatchError, Result};
use crate::metrics::CheckResult;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Budget for one attempt: connect, referrals and reads together.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Finds a domain's expiry date and turns the outcome into a [`CheckResult`].
pub struct WhoisProbe {
    source: Arc<dyn WhoisSource>,
    extractor: ExpiryExtractor,
    attempt_timeout: Duration,
}

impl WhoisProbe {
    pub fn new(source: Arc<dyn WhoisSource>) -> Self {
        Self {
            source,
            extractor: ExpiryExtractor::new(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Probes `domain`, retrying transient failures under `policy`.
    ///
    /// Never fails: faults become an `Error` result carrying the message.
    #[instrument(skip(self, policy), fields(domain = %domain))]
    pub async fn check(&self, domain: &str, policy: &RetryPolicy) -> CheckResult {
        match self.lookup_expiry(domain, policy).await {
            Ok(expiry_date) => {
                let days = days_until(expiry_date, Utc::now());
                debug!(expiry = %expiry_date, days, "WHOIS check succeeded");
                CheckResult::success(domain, expiry_date, days)
            }
            Err(e) => {
                warn!(error = %e, "WHOIS check failed");
                CheckResult::error(domain, e.to_string())
            }
        }
    }

    pub async fn lookup_expiry(&self, domain: &str, policy: &RetryPolicy) -> Result<DateTime<Utc>> {
        let executor = RetryExecutor::new(policy.clone());
        executor.execute(|| self.attempt(domain)).await
    }

    async fn attempt(&self, domain: &str) -> Result<DateTime<Utc>> {
        let raw = timeout(self.attempt_timeout, self.source.query(domain))
            .await
            .map_err(|_| {
                DomwatchError::Timeout(format!(
                    "no answer for {} within {}s",
                    domain,
                    self.attempt_timeout.as_secs()
                ))
            })??;

        self.extract(domain, &raw)
            .ok_or_else(|| DomwatchError::NoExpiryDate(domain.to_string()))
    }

    /// Registry answer first, then each referral hop.
    fn extract(&self, domain: &str, raw: &RawWhois) -> Option<DateTime<Utc>> {
        raw.hops.iter().find_map(|hop| {
            let (text, encoding) = decode_response(&hop.body);
            if !encoding.is_unicode() {
                debug!(server = %hop.server, ?encoding, "Response decoded from a legacy encoding");
            }
            let found = self.extractor.extract(domain, &text)?;
            debug!(server = %hop.server, strategy = found.strategy, "Expiry date found");
            Some(found.expiry_date)
        })
    }
}

/// Whole days from `now` to `expiry`, negative once expired.
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry.date_naive() - now.date_naive()).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CheckStatus;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HangingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WhoisSource for HangingSource {
        async fn query(&self, _domain: &str) -> Result<RawWhois> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RawWhois::default())
        }
    }

    struct CannedSource {
        raw: RawWhois,
        calls: AtomicUsize,
    }

    impl CannedSource {
        fn new(raw: RawWhois) -> Arc<Self> {
            Arc::new(Self {
                raw,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WhoisSource for CannedSource {
        async fn query(&self, _domain: &str) -> Result<RawWhois> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.raw.clone())
        }
    }

    /// Fails with a connection error until `failures` calls have been made.
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WhoisSource for FlakySource {
        async fn query(&self, _domain: &str) -> Result<RawWhois> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(DomwatchError::WhoisConnectionFailed {
                    server: "whois.example".into(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            Ok(RawWhois::single(
                "whois.example",
                "Domain Name: EXAMPLE.COM\nRegistry Expiry Date: 2099-01-01T00:00:00Z\n",
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_retried_then_reported() {
        let source = Arc::new(HangingSource {
            calls: AtomicUsize::new(0),
        });
        let probe = WhoisProbe::new(source.clone());
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));

        let result = probe.check("slow.com", &policy).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result
            .error_message
            .unwrap()
            .to_lowercase()
            .contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_recovers() {
        let source = Arc::new(FlakySource {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let probe = WhoisProbe::new(source.clone());

        let result = probe
            .check("example.com", &RetryPolicy::fixed(3, Duration::from_secs(5)))
            .await;

        assert!(result.is_success());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_expiry_is_not_retried() {
        let source = CannedSource::new(RawWhois::single(
            "whois.example",
            "No match for \"NOPE.COM\".\n",
        ));
        let probe = WhoisProbe::new(source.clone());

        let result = probe
            .check("nope.com", &RetryPolicy::fixed(3, Duration::from_millis(1)))
            .await;

        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(result
            .error_message
            .unwrap()
            .contains("No expiry date found in WHOIS response"));
    }

    #[tokio::test]
    async fn test_referral_hop_supplies_date() {
        let raw = RawWhois {
            hops: vec![
                crate::whois::WhoisHop {
                    server: "whois.registry.example".into(),
                    body: b"Domain Name: EXAMPLE.COM\nRegistrar WHOIS Server: whois.registrar.example\n"
                        .to_vec(),
                },
                crate::whois::WhoisHop {
                    server: "whois.registrar.example".into(),
                    body: b"Registrar Registration Expiration Date: 2099-03-04T00:00:00Z\n".to_vec(),
                },
            ],
        };
        let probe = WhoisProbe::new(CannedSource::new(raw));

        let result = probe.check("example.com", &RetryPolicy::no_retry()).await;

        assert!(result.is_success());
        assert_eq!(
            result.expiry_date,
            Some(Utc.with_ymd_and_hms(2099, 3, 4, 0, 0, 0).unwrap())
        );
        assert!(result.days_until_expiry.unwrap() > 0);
    }

    #[test]
    fn test_days_until_is_unclamped() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        let soon = Utc.with_ymd_and_hms(2025, 1, 20, 1, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 1, 7, 23, 0, 0).unwrap();
        assert_eq!(days_until(soon, now), 10);
        assert_eq!(days_until(now, now), 0);
        assert_eq!(days_until(past, now), -3);
    }
}
