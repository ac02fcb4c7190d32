//! Bounded retries for transient WHOIS failures.
//!
//! A [`RetryPolicy`] is a plain value built from the active configuration
//! snapshot: a fixed number of extra attempts separated by a fixed interval.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DomwatchError, Result};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Delay before each retry.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// A policy with `retries` extra attempts after the first, sleeping `interval` between them.
    pub fn fixed(retries: u32, interval: Duration) -> Self {
        Self {
            max_attempts: retries as usize + 1,
            interval,
        }
    }

    /// Creates a policy that disables retries (single attempt only).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Whether a failed attempt is worth repeating.
///
/// Timeouts and broken connections are transient. Missing expiry dates,
/// unknown TLDs and malformed domains give the same answer every time.
pub fn is_transient(error: &DomwatchError) -> bool {
    matches!(
        error,
        DomwatchError::Timeout(_) | DomwatchError::WhoisConnectionFailed { .. }
    )
}

/// Executes operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Executes an async operation with retry logic.
    ///
    /// Permanent errors are returned unchanged. When every attempt fails
    /// with a transient error the last one is wrapped in
    /// [`DomwatchError::RetryExhausted`] (or returned as-is for a single-attempt policy).
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let e = match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !is_transient(&e) {
                return Err(e);
            }

            if attempt + 1 >= max_attempts {
                if attempt == 0 {
                    return Err(e);
                }
                warn!(attempts = attempt + 1, error = %e, "Operation failed after retries");
                return Err(DomwatchError::RetryExhausted {
                    attempts: attempt + 1,
                    last_error: Box::new(e),
                });
            }

            debug!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = self.policy.interval.as_millis() as u64,
                error = %e,
                "Retrying after transient error"
            );

            tokio::time::sleep(self.policy.interval).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&DomwatchError::Timeout("t".into())));
        assert!(is_transient(&DomwatchError::WhoisConnectionFailed {
            server: "whois.example".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        }));
        assert!(!is_transient(&DomwatchError::NoExpiryDate("a.com".into())));
        assert!(!is_transient(&DomwatchError::InvalidDomain("x".into())));
        assert!(!is_transient(&DomwatchError::WhoisServerNotFound("zz".into())));
        assert!(!is_transient(&DomwatchError::WhoisError("Response too large".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_retries_then_succeeds() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_secs(5)));
        let attempts = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();

        let a = attempts.clone();
        let result: Result<&str> = executor
            .execute(|| {
                let a = a.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(DomwatchError::Timeout("slow".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_exhausts_retries() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(2, Duration::from_secs(1)));
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = attempts.clone();
        let result: Result<()> = executor
            .execute(|| {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(DomwatchError::Timeout("always".into()))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        match err {
            DomwatchError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_executor_no_retry_on_permanent_error() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_millis(1)));
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = attempts.clone();
        let result: Result<()> = executor
            .execute(|| {
                let a = a.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(DomwatchError::NoExpiryDate("a.com".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(DomwatchError::NoExpiryDate(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
