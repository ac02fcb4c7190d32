mod client;
mod decode;
mod extract;
mod parser;
pub mod parsers;
mod probe;
mod servers;

pub use client::{normalize_domain, RawWhois, WhoisClient, WhoisHop, WhoisSource};
pub use decode::{decode_response, TextEncoding};
pub use extract::{
    AlternateFieldStrategy, ExpiryExtractor, ExpiryStrategy, Extracted, ExtractionInput,
    LabelPatternStrategy, RegistryFieldStrategy,
};
pub use parser::{parse_whois_date, WhoisRecord};
pub use probe::{days_until, WhoisProbe, DEFAULT_ATTEMPT_TIMEOUT};
pub use servers::{get_tld, get_whois_server};
