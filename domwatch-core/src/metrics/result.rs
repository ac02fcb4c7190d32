use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Error,
    /// Domain is configured but its first check has not finished.
    Pending,
}

/// Outcome of one check of one domain.
///
/// `days_until_expiry` and `expiry_date` are set only for `Success`;
/// `error_message` only for `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub domain: String,
    pub status: CheckStatus,
    pub days_until_expiry: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn success(domain: impl Into<String>, expiry_date: DateTime<Utc>, days: i64) -> Self {
        Self {
            domain: domain.into(),
            status: CheckStatus::Success,
            days_until_expiry: Some(days),
            expiry_date: Some(expiry_date),
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn error(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            status: CheckStatus::Error,
            days_until_expiry: None,
            expiry_date: None,
            error_message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn pending(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            status: CheckStatus::Pending,
            days_until_expiry: None,
            expiry_date: None,
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Success
    }

    pub fn is_pending(&self) -> bool {
        self.status == CheckStatus::Pending
    }

    /// A failed check counts as critical; so does a domain expiring within
    /// `threshold_days` (inclusive). Pending placeholders never are.
    pub fn is_critical(&self, threshold_days: i64) -> bool {
        match self.status {
            CheckStatus::Error => true,
            CheckStatus::Success => self
                .days_until_expiry
                .map(|days| days <= threshold_days)
                .unwrap_or(true),
            CheckStatus::Pending => false,
        }
    }
}
