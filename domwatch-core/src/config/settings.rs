use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DomwatchError, Result};

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;
const DEFAULT_EXPIRE_THRESHOLD_DAYS: i64 = 15;
const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 50;
const DEFAULT_WHOIS_RETRY_TIMES: u32 = 3;
const DEFAULT_WHOIS_RETRY_INTERVAL_SECS: u64 = 5;
const DEFAULT_METRICS_PORT: u16 = 9394;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Log levels accepted in configuration documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = DomwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(DomwatchError::ConfigValidation(format!(
                "log_level must be one of trace, debug, info, warn, error, fatal (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// One immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    /// Domains to check, unique, in document order.
    pub domains: Vec<String>,
    pub check_interval_seconds: u64,
    pub expire_threshold_days: i64,
    pub max_concurrent_checks: usize,
    pub whois_retry_times: u32,
    pub whois_retry_interval_seconds: u64,
    pub metrics_port: u16,
    pub log_level: LogLevel,
    /// Interval between polls of the remote configuration store.
    pub poll_interval_seconds: u64,
    /// MD5 hex digest of the payload this snapshot was built from. Empty for defaults.
    pub content_hash: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECS,
            expire_threshold_days: DEFAULT_EXPIRE_THRESHOLD_DAYS,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            whois_retry_times: DEFAULT_WHOIS_RETRY_TIMES,
            whois_retry_interval_seconds: DEFAULT_WHOIS_RETRY_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: LogLevel::Info,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            content_hash: String::new(),
        }
    }
}

impl AppConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn whois_retry_interval(&self) -> Duration {
        Duration::from_secs(self.whois_retry_interval_seconds)
    }

    /// Builds a new snapshot from a raw YAML payload.
    ///
    /// Settings missing from the payload keep the values of `base`; the domain
    /// list is always taken from the payload (absent means empty). The result
    /// is validated before it is returned.
    pub fn from_payload(payload: &str, base: &AppConfig) -> Result<AppConfig> {
        let document = ConfigDocument::parse(payload)?;
        let mut config = document.apply_to(base)?;
        config.content_hash = content_digest(payload.as_bytes());
        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: i128) -> Result<()> {
            if value <= 0 {
                return Err(DomwatchError::ConfigValidation(format!(
                    "{} must be positive (got {})",
                    name, value
                )));
            }
            Ok(())
        }

        if self.metrics_port == 0 {
            return Err(DomwatchError::ConfigValidation(
                "metrics_port must be between 1 and 65535".to_string(),
            ));
        }
        positive("check_interval", self.check_interval_seconds as i128)?;
        positive("expire_threshold_days", self.expire_threshold_days as i128)?;
        positive("max_concurrent_checks", self.max_concurrent_checks as i128)?;
        positive("whois_retry_times", self.whois_retry_times as i128)?;
        positive("whois_retry_interval", self.whois_retry_interval_seconds as i128)?;
        positive("nacos_poll_interval", self.poll_interval_seconds as i128)?;

        for domain in &self.domains {
            if domain.trim().is_empty() {
                return Err(DomwatchError::ConfigValidation(
                    "domain entries must be non-empty strings".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// MD5 hex digest used for change detection.
pub fn content_digest(payload: &[u8]) -> String {
    format!("{:x}", md5::compute(payload))
}

/// The `{domains, settings}` document shape shared by the remote store and the local file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub domains: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub settings: Option<SettingsDocument>,
}

/// Raw settings block. Numbers are signed so that negative values reach validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsDocument {
    #[serde(alias = "check_interval_seconds")]
    pub check_interval: Option<i64>,
    pub expire_threshold_days: Option<i64>,
    pub max_concurrent_checks: Option<i64>,
    pub whois_retry_times: Option<i64>,
    #[serde(alias = "whois_retry_interval_seconds")]
    pub whois_retry_interval: Option<i64>,
    pub metrics_port: Option<i64>,
    pub log_level: Option<String>,
    #[serde(alias = "poll_interval")]
    pub nacos_poll_interval: Option<i64>,
}

impl ConfigDocument {
    pub fn parse(payload: &str) -> Result<Self> {
        if payload.trim().is_empty() {
            return Err(DomwatchError::ConfigParse("empty configuration document".to_string()));
        }
        serde_yaml::from_str(payload).map_err(|e| DomwatchError::ConfigParse(e.to_string()))
    }

    /// Merges this document onto `base`, converting and range-checking raw values.
    pub fn apply_to(&self, base: &AppConfig) -> Result<AppConfig> {
        let settings = self.settings.clone().unwrap_or_default();

        let domains = match &self.domains {
            Some(entries) => normalize_domain_list(entries)?,
            None => Vec::new(),
        };

        let log_level = match settings.log_level.as_deref() {
            Some(level) => level.parse()?,
            None => base.log_level,
        };

        let metrics_port = match settings.metrics_port {
            Some(port) => u16::try_from(port)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    DomwatchError::ConfigValidation(format!(
                        "metrics_port must be between 1 and 65535 (got {})",
                        port
                    ))
                })?,
            None => base.metrics_port,
        };

        Ok(AppConfig {
            domains,
            check_interval_seconds: positive_or(
                "check_interval",
                settings.check_interval,
                base.check_interval_seconds,
            )?,
            expire_threshold_days: positive_or(
                "expire_threshold_days",
                settings.expire_threshold_days,
                base.expire_threshold_days,
            )?,
            max_concurrent_checks: positive_or(
                "max_concurrent_checks",
                settings.max_concurrent_checks,
                base.max_concurrent_checks,
            )?,
            whois_retry_times: positive_or(
                "whois_retry_times",
                settings.whois_retry_times,
                base.whois_retry_times,
            )?,
            whois_retry_interval_seconds: positive_or(
                "whois_retry_interval",
                settings.whois_retry_interval,
                base.whois_retry_interval_seconds,
            )?,
            metrics_port,
            log_level,
            poll_interval_seconds: positive_or(
                "nacos_poll_interval",
                settings.nacos_poll_interval,
                base.poll_interval_seconds,
            )?,
            content_hash: base.content_hash.clone(),
        })
    }
}

fn positive_or<T: TryFrom<i64>>(name: &str, value: Option<i64>, fallback: T) -> Result<T> {
    match value {
        None => Ok(fallback),
        Some(v) if v > 0 => T::try_from(v).map_err(|_| {
            DomwatchError::ConfigValidation(format!("{} is out of range (got {})", name, v))
        }),
        Some(v) => Err(DomwatchError::ConfigValidation(format!(
            "{} must be positive (got {})",
            name, v
        ))),
    }
}

fn normalize_domain_list(entries: &[serde_yaml::Value]) -> Result<Vec<String>> {
    let mut domains: Vec<String> = Vec::with_capacity(entries.len());

    for entry in entries {
        let domain = entry
            .as_str()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DomwatchError::ConfigValidation(format!(
                    "invalid domain entry: {:?}",
                    entry
                ))
            })?;

        if domains.contains(&domain) {
            warn!(domain = %domain, "Duplicate domain in configuration, ignoring");
            continue;
        }
        domains.push(domain);
    }

    Ok(domains)
}
