//! Parser for .cn domains (CNNIC format).
//!
//! CNNIC reports China Standard Time wall-clock values without an offset:
//!
//! ```text
//! Domain Name: example.cn
//! Registration Time: 2003-03-17 12:20:05
//! Expiration Time: 2030-03-17 12:48:36
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};

use super::RegistryParser;
use crate::whois::parser::{parse_key_values, parse_whois_date, WhoisRecord};

/// Parser for .cn domains using the CNNIC format.
#[derive(Debug, Clone, Default)]
pub struct CnnicParser;

impl CnnicParser {
    pub fn new() -> Self {
        Self
    }

    /// Keeps the registry's wall clock as-is. Day counts compare calendar
    /// dates, so shifting to UTC would move early-morning expiries to the
    /// previous day.
    fn parse_cnnic_time(value: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl RegistryParser for CnnicParser {
    fn supported_tlds(&self) -> &[&str] {
        &["cn", "com.cn", "net.cn", "org.cn", "gov.cn"]
    }

    fn parse(&self, domain: &str, raw: &str) -> Option<WhoisRecord> {
        let fields = parse_key_values(raw);
        if !fields.iter().any(|(k, _)| k == "domain name" || k == "roid") {
            return None;
        }

        let mut record = WhoisRecord {
            domain: domain.to_string(),
            fields,
            ..WhoisRecord::default()
        };
        record.registrar = record.field("sponsoring registrar").map(str::to_string);
        record.expiration_date = record
            .field("expiration time")
            .and_then(|v| Self::parse_cnnic_time(v).or_else(|| parse_whois_date(v)));

        Some(record)
    }
}
