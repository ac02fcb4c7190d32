use std::path::Path;

use tracing::{info, warn};

use super::AppConfig;
use crate::error::{DomwatchError, Result};

/// Loads the local fallback configuration file once.
///
/// A missing file yields `Ok(None)` so the caller keeps its defaults. A file
/// that exists but does not parse or validate is an error.
pub fn load_local_config(path: &Path, base: &AppConfig) -> Result<Option<AppConfig>> {
    if !path.exists() {
        warn!(path = %path.display(), "Configuration file not found, using defaults");
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        DomwatchError::ConfigParse(format!("failed to read {}: {}", path.display(), e))
    })?;

    let config = AppConfig::from_payload(&content, base)?;
    info!(
        path = %path.display(),
        domains = config.domains.len(),
        "Configuration loaded from local file"
    );
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_local_config(&dir.path().join("nope.yml"), &AppConfig::default());
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_loads_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "domains:\n  - a.com\n  - b.com\nsettings:\n  expire_threshold_days: 20"
        )
        .unwrap();

        let config = load_local_config(file.path(), &AppConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(config.domains, vec!["a.com", "b.com"]);
        assert_eq!(config.expire_threshold_days, 20);
        assert!(!config.content_hash.is_empty());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings:\n  metrics_port: -1").unwrap();

        assert!(load_local_config(file.path(), &AppConfig::default()).is_err());
    }
}
