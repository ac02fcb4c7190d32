//! Remote configuration store (Nacos-compatible HTTP API).

mod client;
mod sync;

pub use client::{ConfigStoreClient, RemoteSettings, DEFAULT_DATA_ID, DEFAULT_GROUP, TOKEN_REFRESH_MARGIN};
pub use sync::{ChangeCallback, ConfigSynchronizer, SyncOutcome, INITIAL_SYNC_WINDOW};
