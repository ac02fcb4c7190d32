//! Generic parser for the ICANN `Key: Value` layout.

use super::RegistryParser;
use crate::whois::parser::{parse_key_values, parse_whois_date, WhoisRecord};

const EXPIRY_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
];

const DOMAIN_KEYS: &[&str] = &["domain name", "domain"];

/// Generic parser used when no registry-specific grammar applies.
#[derive(Debug, Clone, Default)]
pub struct GenericParser;

impl GenericParser {
    pub fn new() -> Self {
        Self
    }
}

impl RegistryParser for GenericParser {
    fn supported_tlds(&self) -> &[&str] {
        // Empty - this is the fallback parser
        &[]
    }

    fn parse(&self, domain: &str, raw: &str) -> Option<WhoisRecord> {
        let fields = parse_key_values(raw);
        if !fields.iter().any(|(k, _)| DOMAIN_KEYS.contains(&k.as_str())) {
            return None;
        }

        let mut record = WhoisRecord {
            domain: domain.to_string(),
            fields,
            ..WhoisRecord::default()
        };
        record.registrar = record.field("registrar").map(str::to_string);
        record.expiration_date = EXPIRY_KEYS
            .iter()
            .filter_map(|key| record.field(key))
            .find_map(parse_whois_date);

        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_parser_icann_layout() {
        let raw = r#"
   Domain Name: EXAMPLE.COM
   Registrar: Example Registrar, Inc.
   Creation Date: 1995-08-14T04:00:00Z
   Registry Expiry Date: 2030-08-13T04:00:00Z
   Name Server: A.IANA-SERVERS.NET
"#;
        let record = GenericParser::new().parse("example.com", raw).unwrap();

        assert_eq!(record.registrar.as_deref(), Some("Example Registrar, Inc."));
        assert_eq!(
            record.expiration_date.unwrap().to_rfc3339(),
            "2030-08-13T04:00:00+00:00"
        );
    }

    #[test]
    fn test_generic_parser_recognized_without_expiry() {
        let raw = "Domain Name: example.io\nRegistrar: Foo\n";
        let record = GenericParser::new().parse("example.io", raw).unwrap();
        assert!(record.expiration_date.is_none());
        assert_eq!(record.field("REGISTRAR"), Some("Foo"));
    }
}
