use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Structured view of a WHOIS response produced by a registry grammar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    pub domain: String,
    pub registrar: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Every `key: value` pair found, keys lowercased, in response order.
    pub fields: Vec<(String, String)>,
}

impl WhoisRecord {
    /// First non-empty value stored under `key` (case-insensitive).
    pub fn field(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.fields
            .iter()
            .find(|(k, v)| *k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

static KEY_VALUE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 /_().'-]{0,60}?)\s*:\s*(.*?)\s*$")
        .expect("Invalid key/value regex")
});

/// Splits `Key: Value` lines. Comment lines (`%`, `#`, `>>>`) are skipped.
pub fn parse_key_values(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with('%') || trimmed.starts_with('#') || trimmed.starts_with(">>>"))
        })
        .filter_map(|line| {
            let caps = KEY_VALUE_LINE.captures(line)?;
            let key = caps.get(1)?.as_str().trim().to_lowercase();
            let value = caps.get(2)?.as_str().trim().to_string();
            Some((key, value))
        })
        .collect()
}

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*\)").expect("Invalid parenthetical regex"));

static FRACTIONAL_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2})\.\d+").expect("Invalid fraction regex"));

static TRAILING_TZ_ABBREV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[A-Z]{2,5}$").expect("Invalid timezone regex"));

static EMBEDDED_YMD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})").expect("Invalid ymd regex")
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

/// Normalizes a free-text date before parsing.
///
/// Collapses whitespace and strips parenthetical remarks, sub-second
/// fractions and a trailing timezone abbreviation (`UTC`, `CST`, ...).
pub fn clean_date_text(date_str: &str) -> String {
    let collapsed = date_str.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_remarks = PARENTHETICAL.replace_all(&collapsed, "");
    let without_fraction = FRACTIONAL_SECONDS.replace_all(&without_remarks, "$1");
    let without_tz = TRAILING_TZ_ABBREV.replace(without_fraction.trim(), "");
    without_tz.trim().to_string()
}

/// Parses a WHOIS date string.
///
/// Explicit formats are tried first, in order; generic parsing (RFC 3339,
/// RFC 2822, an embedded year-month-day) is the fallback.
pub fn parse_whois_date(date_str: &str) -> Option<DateTime<Utc>> {
    let cleaned = clean_date_text(date_str);
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(dt.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    generic_date_parse(&cleaned)
}

fn generic_date_parse(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let caps = EMBEDDED_YMD.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}
