//! Prometheus text exposition and the `/health` + `/metrics` HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::result::CheckStatus;
use super::store::{MetricsSnapshot, MetricsStore};
use crate::config::ConfigHandle;
use crate::error::{DomwatchError, Result};
use crate::shutdown::ShutdownListener;

/// Content type of the Prometheus text format, version 0.0.4.
pub const METRICS_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

fn domain_gauge(name: &str, help: &str) -> Result<IntGaugeVec> {
    IntGaugeVec::new(Opts::new(name, help), &["domain"])
        .map_err(|e| DomwatchError::Exporter(e.to_string()))
}

/// Renders one scrape from a snapshot.
///
/// A fresh registry is built per call so domains dropped from the
/// configuration disappear from the output immediately.
pub fn render_metrics(snapshot: &MetricsSnapshot, threshold_days: i64) -> Result<String> {
    let expire_days = domain_gauge("domain_expire_days", "Days until domain expiration")?;
    let expired = domain_gauge(
        "domain_expired",
        "Whether domain is expired or near expiration (1 = critical)",
    )?;
    let check_status = domain_gauge(
        "domain_check_status",
        "Status of last WHOIS check (1 = success, 0 = failure)",
    )?;
    let checked_at = domain_gauge(
        "domain_check_timestamp_seconds",
        "Unix time of the last completed check",
    )?;

    let mut domains: Vec<&String> = snapshot.keys().collect();
    domains.sort();

    for domain in domains {
        let result = &snapshot[domain];
        let labels = [domain.as_str()];

        match result.status {
            CheckStatus::Pending => {
                check_status.with_label_values(&labels).set(0);
                expire_days.with_label_values(&labels).set(-1);
            }
            CheckStatus::Success | CheckStatus::Error => {
                let days = if result.is_success() {
                    result.days_until_expiry.unwrap_or(-1)
                } else {
                    -1
                };
                expire_days.with_label_values(&labels).set(days);
                expired
                    .with_label_values(&labels)
                    .set(i64::from(result.is_critical(threshold_days)));
                check_status
                    .with_label_values(&labels)
                    .set(i64::from(result.is_success()));
                checked_at
                    .with_label_values(&labels)
                    .set(result.checked_at.timestamp());
            }
        }
    }

    let registry = Registry::new();
    for gauge in [expire_days, expired, check_status, checked_at] {
        registry
            .register(Box::new(gauge))
            .map_err(|e| DomwatchError::Exporter(e.to_string()))?;
    }

    let mut buffer = String::new();
    TextEncoder::new()
        .encode_utf8(&registry.gather(), &mut buffer)
        .map_err(|e| DomwatchError::Exporter(e.to_string()))?;
    Ok(buffer)
}

/// Shared state behind the HTTP handlers.
#[derive(Debug, Clone)]
pub struct ExporterState {
    pub store: Arc<MetricsStore>,
    pub config: ConfigHandle,
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn scrape(State(state): State<ExporterState>) -> Response {
    let threshold = state.config.current().expire_threshold_days;
    match render_metrics(&state.store.snapshot(), threshold) {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn router(state: ExporterState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(scrape))
        .with_state(state)
}

/// A bound but not yet serving metrics endpoint.
pub struct MetricsServer {
    listener: TcpListener,
    state: ExporterState,
}

impl MetricsServer {
    pub async fn bind(addr: SocketAddr, state: ExporterState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DomwatchError::Exporter(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DomwatchError::Exporter(e.to_string()))
    }

    /// Serves until shutdown is requested, then drains in-flight requests.
    pub async fn run(self, mut shutdown: ShutdownListener) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Metrics server listening");
        }

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.requested().await })
            .await
            .map_err(|e| DomwatchError::Exporter(e.to_string()))?;

        info!("Metrics server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::CheckResult;
    use chrono::Utc;

    fn sample(name: &str, text: &str) -> Option<i64> {
        text.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    #[test]
    fn test_expiry_scenario() {
        let store = MetricsStore::new();
        store.record(CheckResult::success("a.com", Utc::now(), 10));
        store.record(CheckResult::success("b.com", Utc::now(), 400));

        let text = render_metrics(&store.snapshot(), 15).unwrap();

        assert_eq!(sample("domain_expire_days{domain=\"a.com\"}", &text), Some(10));
        assert_eq!(sample("domain_expired{domain=\"a.com\"}", &text), Some(1));
        assert_eq!(sample("domain_expired{domain=\"b.com\"}", &text), Some(0));
        assert_eq!(sample("domain_check_status{domain=\"a.com\"}", &text), Some(1));
        assert_eq!(sample("domain_check_status{domain=\"b.com\"}", &text), Some(1));
        assert!(text.contains("# TYPE domain_expire_days gauge"));
    }

    #[test]
    fn test_error_and_pending_series() {
        let store = MetricsStore::new();
        store.record(CheckResult::error("c.com", "WHOIS timeout"));
        store.record(CheckResult::pending("d.com"));

        let text = render_metrics(&store.snapshot(), 15).unwrap();

        assert_eq!(sample("domain_expire_days{domain=\"c.com\"}", &text), Some(-1));
        assert_eq!(sample("domain_expired{domain=\"c.com\"}", &text), Some(1));
        assert_eq!(sample("domain_check_status{domain=\"c.com\"}", &text), Some(0));
        assert!(sample("domain_check_timestamp_seconds{domain=\"c.com\"}", &text).is_some());

        assert_eq!(sample("domain_check_status{domain=\"d.com\"}", &text), Some(0));
        assert_eq!(sample("domain_expire_days{domain=\"d.com\"}", &text), Some(-1));
        assert!(!text.contains("domain_expired{domain=\"d.com\"}"));
        assert!(!text.contains("domain_check_timestamp_seconds{domain=\"d.com\"}"));
    }

    #[test]
    fn test_pruned_domains_disappear() {
        let store = MetricsStore::new();
        store.record(CheckResult::success("a.com", Utc::now(), 10));
        store.record(CheckResult::success("gone.com", Utc::now(), 10));
        store.prune(&["a.com".to_string()]);

        let text = render_metrics(&store.snapshot(), 15).unwrap();
        assert!(!text.contains("gone.com"));
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let store = Arc::new(MetricsStore::new());
        store.record(CheckResult::success("a.com", Utc::now(), 10));
        let state = ExporterState {
            store,
            config: ConfigHandle::new(AppConfig::default()),
        };

        let response = scrape(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("domain_expired{domain=\"a.com\"} 1"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        assert_eq!(health_check().await, "OK");
    }

    #[tokio::test]
    async fn test_server_serves_until_shutdown() {
        use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownSignal};

        let state = ExporterState {
            store: Arc::new(MetricsStore::new()),
            config: ConfigHandle::new(AppConfig::default()),
        };
        let coordinator = ShutdownCoordinator::new();
        let server = MetricsServer::bind("127.0.0.1:0".parse().unwrap(), state)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.run(coordinator.listener()));

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        let (tx, rx) = tokio::sync::mpsc::channel(1);
        tx.send(ShutdownSignal::Terminate).await.unwrap();
        let outcome = coordinator
            .run(rx, async move {
                task.await.unwrap().unwrap();
            })
            .await;
        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }
}
