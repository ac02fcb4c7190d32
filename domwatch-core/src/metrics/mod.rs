mod exporter;
mod result;
mod store;

pub use exporter::{
    health_check, render_metrics, router, scrape, ExporterState, MetricsServer, METRICS_CONTENT_TYPE,
};
pub use result::{CheckResult, CheckStatus};
pub use store::{MetricsSnapshot, MetricsStore, Reconciled, StoreSummary};
