use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, instrument, warn};

use super::servers::{get_tld, get_whois_server, parse_iana_referral, IANA_WHOIS_SERVER};
use crate::error::{DomwatchError, Result};

const WHOIS_PORT: u16 = 43;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Registry query plus referrals. Stays under `WhoisProbe`'s per-attempt budget
/// so a stalled registrar cannot cost the registry answer.
const DEFAULT_LOOKUP_BUDGET: Duration = Duration::from_secs(12);
const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB
const MAX_REFERRAL_DEPTH: usize = 3;

/// One server's answer, still undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct WhoisHop {
    pub server: String,
    pub body: Vec<u8>,
}

/// Raw responses for one lookup: the registry answer first, then any
/// registrar referrals that were followed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawWhois {
    pub hops: Vec<WhoisHop>,
}

impl RawWhois {
    pub fn single(server: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            hops: vec![WhoisHop {
                server: server.into(),
                body: body.into(),
            }],
        }
    }
}

/// Where WHOIS answers come from. The TCP client is the production source.
#[async_trait]
pub trait WhoisSource: Send + Sync {
    async fn query(&self, domain: &str) -> Result<RawWhois>;
}

#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
    lookup_budget: Duration,
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            lookup_budget: DEFAULT_LOOKUP_BUDGET,
        }
    }

    /// Timeout applied to each connect, write and read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deadline for the whole lookup, measured from its start. Referrals
    /// still outstanding when it passes are dropped.
    pub fn with_lookup_budget(mut self, budget: Duration) -> Self {
        self.lookup_budget = budget;
        self
    }

    #[instrument(skip(self), fields(domain = %domain))]
    pub async fn lookup(&self, domain: &str) -> Result<RawWhois> {
        let deadline = Instant::now() + self.lookup_budget;
        let domain = normalize_domain(domain)?;
        let tld = get_tld(&domain).ok_or_else(|| DomwatchError::InvalidDomain(domain.clone()))?;

        let server = match get_whois_server(tld) {
            Some(server) => server.to_string(),
            None => self.discover_server(tld).await?,
        };

        debug!(whois_server = %server, "Querying registry WHOIS server");
        let body = self.query_server(&server, &domain).await?;

        let mut raw = RawWhois {
            hops: vec![WhoisHop {
                server: server.clone(),
                body,
            }],
        };

        self.follow_referrals_until(&domain, &mut raw, deadline).await;
        Ok(raw)
    }

    /// Asks IANA which server is authoritative for an unknown TLD.
    async fn discover_server(&self, tld: &str) -> Result<String> {
        debug!(tld = %tld, "TLD not in table, asking IANA");
        let body = self.query_server(IANA_WHOIS_SERVER, tld).await?;
        let text = String::from_utf8_lossy(&body);
        parse_iana_referral(&text).ok_or_else(|| DomwatchError::WhoisServerNotFound(tld.to_string()))
    }

    /// Follows referrals until the chain ends or `deadline` passes. Hops
    /// gathered before the deadline are kept.
    async fn follow_referrals_until(&self, domain: &str, raw: &mut RawWhois, deadline: Instant) {
        if timeout_at(deadline, self.follow_referral_chain(domain, raw))
            .await
            .is_err()
        {
            warn!(
                hops = raw.hops.len(),
                "Referral chain ran out of time, keeping responses so far"
            );
        }
    }

    /// Appends registrar referrals. A failing referral ends the chain without
    /// failing the lookup: the registry answer is already in hand.
    async fn follow_referral_chain(&self, domain: &str, raw: &mut RawWhois) {
        let mut visited: HashSet<String> = raw.hops.iter().map(|h| h.server.to_lowercase()).collect();

        while raw.hops.len() <= MAX_REFERRAL_DEPTH {
            let Some(last) = raw.hops.last() else { break };
            let text = String::from_utf8_lossy(&last.body);
            let Some(referral) = extract_referral(&text) else { break };

            if !visited.insert(referral.clone()) {
                debug!(referral = %referral, "Referral already visited");
                break;
            }

            debug!(referral = %referral, "Following referral");
            match self.query_server(&referral, domain).await {
                Ok(body) => raw.hops.push(WhoisHop {
                    server: referral,
                    body,
                }),
                Err(e) => {
                    warn!(referral = %referral, error = %e, "Referral lookup failed, keeping registry response");
                    break;
                }
            }
        }
    }

    async fn query_server(&self, server: &str, query: &str) -> Result<Vec<u8>> {
        // Referrals occasionally name a port (`whois.example.net:4343`).
        let addr = if server.contains(':') {
            server.to_string()
        } else {
            format!("{}:{}", server, WHOIS_PORT)
        };
        let connection_failed = |source| DomwatchError::WhoisConnectionFailed {
            server: server.to_string(),
            source,
        };

        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| DomwatchError::Timeout(format!("Connection to {} timed out", server)))?
            .map_err(connection_failed)?;

        let query_bytes = format!("{}\r\n", query);
        timeout(self.timeout, stream.write_all(query_bytes.as_bytes()))
            .await
            .map_err(|_| DomwatchError::Timeout(format!("Write to {} timed out", server)))?
            .map_err(connection_failed)?;

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            match timeout(self.timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.len() > MAX_RESPONSE_SIZE {
                        return Err(DomwatchError::WhoisError("Response too large".to_string()));
                    }
                }
                Ok(Err(e)) => return Err(connection_failed(e)),
                Err(_) => {
                    // Some servers never close; keep what arrived.
                    if !response.is_empty() {
                        break;
                    }
                    return Err(DomwatchError::Timeout(format!("Read from {} timed out", server)));
                }
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl WhoisSource for WhoisClient {
    async fn query(&self, domain: &str) -> Result<RawWhois> {
        self.lookup(domain).await
    }
}

/// Lowercases and strips scheme, path and `www.`.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();

    let domain = domain
        .strip_prefix("http://")
        .or_else(|| domain.strip_prefix("https://"))
        .unwrap_or(&domain);

    let domain = domain.split('/').next().unwrap_or(domain);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    let domain = domain.trim_end_matches('.');

    if domain.is_empty() || !domain.contains('.') || domain.contains("..") {
        return Err(DomwatchError::InvalidDomain(domain.to_string()));
    }

    let valid = domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(DomwatchError::InvalidDomain(domain.to_string()));
    }

    Ok(domain.to_string())
}

static REFERRAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^\s*Registrar WHOIS Server:\s*(\S+)",
        r"(?im)^\s*Whois Server:\s*(\S+)",
        r"(?im)^\s*ReferralServer:\s*whois://(\S+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid referral regex"))
    .collect()
});

fn extract_referral(response: &str) -> Option<String> {
    REFERRAL_PATTERNS.iter().find_map(|re| {
        let server = re.captures(response)?.get(1)?.as_str().trim().to_lowercase();
        let server = server
            .trim_start_matches("whois://")
            .trim_end_matches('/')
            .to_string();
        (!server.is_empty() && server.contains('.')).then_some(server)
    })
}
