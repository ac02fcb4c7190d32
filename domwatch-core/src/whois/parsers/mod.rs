//! Registry-specific WHOIS grammars.
//!
//! Registries disagree on field names, layout and date formats. A
//! specialized parser is chosen by TLD; the generic ICANN key/value grammar
//! covers everything else. A parser returns `None` when it does not
//! recognize the response at all.

mod cnnic;
mod generic;
mod nominet;

use once_cell::sync::Lazy;

use super::parser::WhoisRecord;
pub use cnnic::CnnicParser;
pub use generic::GenericParser;
pub use nominet::NominetParser;

/// Trait for registry-specific WHOIS parsers.
pub trait RegistryParser: Send + Sync {
    /// Returns the TLDs this parser handles.
    fn supported_tlds(&self) -> &[&str];

    /// Parses a decoded WHOIS response, or returns `None` if the layout is not recognized.
    fn parse(&self, domain: &str, raw: &str) -> Option<WhoisRecord>;
}

/// Registry of all available parsers.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn RegistryParser>>,
    fallback: GenericParser,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: vec![
                Box::new(NominetParser::new()), // .uk, .co.uk
                Box::new(CnnicParser::new()),   // .cn, .com.cn
            ],
            fallback: GenericParser::new(),
        }
    }

    /// Parses with the parser for the domain's TLD, falling back to the generic grammar.
    pub fn parse(&self, domain: &str, raw: &str) -> Option<WhoisRecord> {
        let tld = extract_tld(domain);
        let sld_tld = extract_second_level_tld(domain);

        let specialized = self.parsers.iter().find(|parser| {
            let supported = parser.supported_tlds();
            sld_tld
                .as_deref()
                .is_some_and(|sld| supported.contains(&sld))
                || tld.as_deref().is_some_and(|t| supported.contains(&t))
        });

        specialized
            .and_then(|parser| parser.parse(domain, raw))
            .or_else(|| self.fallback.parse(domain, raw))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global parser registry instance.
pub static PARSER_REGISTRY: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::new);

fn extract_tld(domain: &str) -> Option<String> {
    domain.rsplit('.').next().map(|s| s.to_lowercase())
}

/// Extracts the second-level TLD (e.g., "co.uk" from "example.co.uk").
fn extract_second_level_tld(domain: &str) -> Option<String> {
    let parts: Vec<&str> = domain.rsplit('.').collect();
    if parts.len() >= 2 {
        Some(format!("{}.{}", parts[1].to_lowercase(), parts[0].to_lowercase()))
    } else {
        None
    }
}
