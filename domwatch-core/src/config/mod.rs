//! Application configuration snapshots.
//!
//! An [`AppConfig`] is immutable once built. Updates produce a new snapshot
//! that is validated first and then published whole through a
//! [`ConfigHandle`], so readers always see either the old or the new value.

mod handle;
mod local;
mod settings;

pub use handle::ConfigHandle;
pub use local::load_local_config;
pub use settings::{content_digest, AppConfig, ConfigDocument, LogLevel, SettingsDocument};
