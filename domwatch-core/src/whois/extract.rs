//! Expiry date extraction.
//!
//! Strategies run in a fixed order and the first one that yields a date wins:
//! the registry grammar, alternate structured field names, then label
//! patterns over the raw text.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::parser::{parse_whois_date, WhoisRecord};
use super::parsers::PARSER_REGISTRY;

/// What a strategy gets to look at.
#[derive(Debug)]
pub struct ExtractionInput<'a> {
    pub domain: &'a str,
    pub text: &'a str,
    /// Structured record, if a registry grammar recognized the response.
    pub record: Option<&'a WhoisRecord>,
}

/// One way of finding an expiry date.
pub trait ExpiryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, input: &ExtractionInput<'_>) -> Option<DateTime<Utc>>;
}

/// The registry parser's own expiration field.
#[derive(Debug, Default)]
pub struct RegistryFieldStrategy;

impl ExpiryStrategy for RegistryFieldStrategy {
    fn name(&self) -> &'static str {
        "registry-parser"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Option<DateTime<Utc>> {
        input.record?.expiration_date
    }
}

/// Registrar-specific field names that the registry grammars do not map.
const ALTERNATE_FIELDS: &[&str] = &[
    "expiry date",
    "expiration date",
    "expiration time",
    "expires at",
    "expires on",
    "expiry",
    "expires",
    "expire",
    "expire date",
    "paid-till",
    "free-date",
    "renewal date",
    "valid until",
];

#[derive(Debug, Default)]
pub struct AlternateFieldStrategy;

impl ExpiryStrategy for AlternateFieldStrategy {
    fn name(&self) -> &'static str {
        "alternate-fields"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Option<DateTime<Utc>> {
        let record = input.record?;
        ALTERNATE_FIELDS
            .iter()
            .filter_map(|key| record.field(key))
            .find_map(parse_whois_date)
    }
}

static LABEL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^\s*registry\s*expir(?:y|ation)\s*date\s*:\s*(.+)$",
        r"(?im)^\s*registrar\s*registration\s*expir(?:y|ation)\s*date\s*:\s*(.+)$",
        r"(?im)expir(?:y|ation|es)\s*(?:date|time)?\s*:\s*(.+)$",
        r"(?im)renewal\s*date\s*:\s*(.+)$",
        r"(?im)expires?\s*(?:on|at)?\s*:\s*(.+)$",
        r"(?im)valid\s*until\s*:?\s*(.+)$",
        r"(?im)paid-till\s*:\s*(.+)$",
        r"(?im)date\s*d'expiration\s*:\s*(.+)$",
        r"(?im)(?:过期时间|到期时间|到期日期|有效期至)\s*[:：]\s*(.+)$",
        r"(?im)\[?有効期限\]?\s*[:：]?\s*(.+)$",
        r"(?im)\[?状態\]?\s*Connected\s*\((.+)\)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid expiry label regex"))
    .collect()
});

/// Label variants matched directly over the raw response.
#[derive(Debug, Default)]
pub struct LabelPatternStrategy;

impl ExpiryStrategy for LabelPatternStrategy {
    fn name(&self) -> &'static str {
        "text-patterns"
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Option<DateTime<Utc>> {
        for pattern in LABEL_PATTERNS.iter() {
            for caps in pattern.captures_iter(input.text) {
                let Some(m) = caps.get(1) else { continue };
                let candidate = m.as_str().trim();
                debug!(domain = %input.domain, candidate = %candidate, "Found potential expiry date");
                if let Some(date) = parse_whois_date(candidate) {
                    return Some(date);
                }
            }
        }
        None
    }
}

/// An extracted date and the strategy that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub expiry_date: DateTime<Utc>,
    pub strategy: &'static str,
}

/// Ordered list of strategies.
pub struct ExpiryExtractor {
    strategies: Vec<Box<dyn ExpiryStrategy>>,
}

impl Default for ExpiryExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryExtractor {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(RegistryFieldStrategy),
                Box::new(AlternateFieldStrategy),
                Box::new(LabelPatternStrategy),
            ],
        }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExpiryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, domain: &str, text: &str) -> Option<Extracted> {
        let record = PARSER_REGISTRY.parse(domain, text);
        let input = ExtractionInput {
            domain,
            text,
            record: record.as_ref(),
        };

        for strategy in &self.strategies {
            if let Some(expiry_date) = strategy.extract(&input) {
                debug!(domain = %domain, strategy = strategy.name(), "Expiry date extracted");
                return Some(Extracted {
                    expiry_date,
                    strategy: strategy.name(),
                });
            }
            debug!(domain = %domain, strategy = strategy.name(), "Strategy found no expiry date");
        }

        None
    }
}
