pub mod checker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod remote;
pub mod retry;
pub mod shutdown;
pub mod whois;

pub use error::{DomwatchError, Result};
pub use retry::{RetryExecutor, RetryPolicy};

pub use checker::{CheckerPool, CycleOutcome, CycleSummary, Scheduler};
pub use config::{load_local_config, AppConfig, ConfigHandle, LogLevel};
pub use metrics::{CheckResult, CheckStatus, ExporterState, MetricsServer, MetricsStore};
pub use remote::{ConfigStoreClient, ConfigSynchronizer, RemoteSettings};
pub use shutdown::{ShutdownCoordinator, ShutdownListener, ShutdownOutcome, ShutdownSignal, ShutdownState};
pub use whois::{WhoisClient, WhoisProbe, WhoisSource};
