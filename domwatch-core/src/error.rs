use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomwatchError {
    #[error("Config fetch failed: {0}")]
    ConfigFetch(String),

    #[error("Config parse failed: {0}")]
    ConfigParse(String),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("WHOIS timeout: {0}")]
    Timeout(String),

    #[error("WHOIS connection to {server} failed: {source}")]
    WhoisConnectionFailed {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("WHOIS lookup failed: {0}")]
    WhoisError(String),

    #[error("WHOIS server not found for TLD: {0}")]
    WhoisServerNotFound(String),

    #[error("No expiry date found in WHOIS response for {0}")]
    NoExpiryDate(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Check cycle failed: {0}")]
    Cycle(String),

    #[error("Metrics exporter error: {0}")]
    Exporter(String),

    #[error("Failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: usize,
        last_error: Box<DomwatchError>,
    },
}

impl DomwatchError {
    /// True when this error, or the last error behind an exhausted retry, is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            DomwatchError::Timeout(_) => true,
            DomwatchError::Http(e) => e.is_timeout(),
            DomwatchError::RetryExhausted { last_error, .. } => last_error.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomwatchError>;
