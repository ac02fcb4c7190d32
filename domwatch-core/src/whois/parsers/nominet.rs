//! Parser for .uk domains (Nominet format).
//!
//! Nominet uses a section-based layout: a heading line ending in `:` with
//! the value indented on the following line(s). Newer responses nest
//! inline `Key: value` pairs under a `Relevant dates:` heading.
//!
//! ```text
//!     Domain name:
//!         example.co.uk
//!
//!     Relevant dates:
//!         Registered on: 26-Aug-1996
//!         Expiry date:  26-Aug-2030
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use super::RegistryParser;
use crate::whois::parser::{parse_key_values, parse_whois_date, WhoisRecord};

static SECTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z ]*):\s*$").expect("Invalid Nominet heading regex"));

/// Parser for .uk domains using the Nominet format.
#[derive(Debug, Clone, Default)]
pub struct NominetParser;

impl NominetParser {
    pub fn new() -> Self {
        Self
    }

    /// Collects `heading -> first value line` pairs.
    fn section_fields(raw: &str) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        let mut current: Option<String> = None;

        for line in raw.lines() {
            if let Some(caps) = SECTION_HEADING.captures(line) {
                current = caps.get(1).map(|m| m.as_str().trim().to_lowercase());
                continue;
            }

            let value = line.trim();
            if value.is_empty() {
                current = None;
                continue;
            }

            if let Some(heading) = current.take() {
                fields.push((heading, value.to_string()));
            }
        }

        fields
    }
}

impl RegistryParser for NominetParser {
    fn supported_tlds(&self) -> &[&str] {
        &["uk", "co.uk", "org.uk", "me.uk", "ltd.uk", "plc.uk"]
    }

    fn parse(&self, domain: &str, raw: &str) -> Option<WhoisRecord> {
        let mut fields = Self::section_fields(raw);
        if !fields.iter().any(|(k, _)| k == "domain name") {
            return None;
        }
        fields.extend(parse_key_values(raw));

        let mut record = WhoisRecord {
            domain: domain.to_string(),
            fields,
            ..WhoisRecord::default()
        };
        record.registrar = record.field("registrar").map(str::to_string);
        record.expiration_date = record.field("expiry date").and_then(parse_whois_date);

        Some(record)
    }
}
