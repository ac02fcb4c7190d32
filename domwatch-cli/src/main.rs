use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use domwatch_core::config::{load_local_config, AppConfig, ConfigHandle, LogLevel};
use domwatch_core::metrics::{ExporterState, MetricsServer, MetricsStore};
use domwatch_core::remote::{ConfigStoreClient, ConfigSynchronizer, RemoteSettings, DEFAULT_DATA_ID, DEFAULT_GROUP};
use domwatch_core::shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownSignal};
use domwatch_core::{CheckerPool, Scheduler, WhoisClient, WhoisProbe};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser)]
#[command(name = "domwatch")]
#[command(about = "Domain expiration monitor exposing Prometheus metrics")]
#[command(version)]
struct Cli {
    /// Config store address (e.g. http://nacos:8848). The local file is used when unset.
    #[arg(long, env = "NACOS_ADDR")]
    nacos_addr: Option<String>,

    /// Config store namespace (sent as tenant)
    #[arg(long, env = "NACOS_NAMESPACE")]
    nacos_namespace: Option<String>,

    #[arg(long, env = "NACOS_GROUP", default_value = DEFAULT_GROUP)]
    nacos_group: String,

    #[arg(long, env = "NACOS_DATA_ID", default_value = DEFAULT_DATA_ID)]
    nacos_data_id: String,

    #[arg(long, env = "NACOS_USERNAME")]
    nacos_username: Option<String>,

    #[arg(long, env = "NACOS_PASSWORD", hide_env_values = true)]
    nacos_password: Option<String>,

    /// Local configuration file, read once at startup when no config store is set
    #[arg(long, env = "CONFIG_FILE", default_value = "config/domains.yml")]
    config_file: PathBuf,

    /// Worker count override (takes precedence over max_concurrent_checks)
    #[arg(long, env = "MAX_CONCURRENT_CHECKS")]
    max_concurrent_checks: Option<usize>,

    /// Address the metrics server binds to
    #[arg(long, env = "METRICS_BIND", default_value = "0.0.0.0")]
    metrics_bind: IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A local `.env` may carry the NACOS_* connection settings.
    let env_file = dotenv::dotenv().ok();
    let cli = Cli::parse();
    let (log_filter, env_filter_set) = init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting domwatch");
    if let Some(path) = env_file {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let (signal_tx, mut signal_rx) = mpsc::channel(4);
    forward_signals(signal_tx)?;

    let defaults = AppConfig::default();
    let config = ConfigHandle::new(defaults.clone());

    let mut synchronizer = match cli.nacos_addr.as_deref().filter(|addr| !addr.trim().is_empty()) {
        Some(addr) => {
            let settings = RemoteSettings::new(addr)
                .with_namespace(cli.nacos_namespace.clone())
                .with_group(cli.nacos_group.clone())
                .with_data_id(cli.nacos_data_id.clone())
                .with_credentials(cli.nacos_username.clone(), cli.nacos_password.clone());
            let client = ConfigStoreClient::new(settings).context("Failed to create config store client")?;
            let synchronizer = ConfigSynchronizer::new(client, config.clone());

            info!(addr = %addr, "Waiting for initial configuration from config store");
            match unless_signalled(synchronizer.initial_sync(), &mut signal_rx).await {
                Some(synced) => synced.context("Initial configuration rejected")?,
                None => return Ok(()),
            }
            Some(synchronizer)
        }
        None => {
            info!(path = %cli.config_file.display(), "Config store not configured, using local file");
            if let Some(local) = load_local_config(&cli.config_file, &defaults)
                .with_context(|| format!("Invalid configuration file {}", cli.config_file.display()))?
            {
                config.publish(local);
            }
            None
        }
    };

    let initial = config.current();
    if !env_filter_set {
        apply_log_level(&log_filter, initial.log_level);
    }
    info!(
        domains = initial.domains.len(),
        check_interval = initial.check_interval_seconds,
        threshold_days = initial.expire_threshold_days,
        "Configuration ready"
    );

    let store = Arc::new(MetricsStore::new());
    let probe = Arc::new(WhoisProbe::new(Arc::new(WhoisClient::new())));
    let pool = Arc::new(
        CheckerPool::new(probe, store.clone(), config.clone())
            .with_concurrency_override(cli.max_concurrent_checks),
    );
    let scheduler = Scheduler::new(pool, store.clone(), config.clone());

    if let Some(sync) = synchronizer.as_mut() {
        let filter = log_filter.clone();
        sync.on_change(move |applied| {
            if env_filter_set {
                debug!("RUST_LOG is set, ignoring configured log level");
            } else {
                apply_log_level(&filter, applied.log_level);
            }
        });

        let scheduler = scheduler.clone();
        sync.on_change(move |applied| scheduler.config_changed(applied));
    }

    let addr = SocketAddr::new(cli.metrics_bind, initial.metrics_port);
    let server = MetricsServer::bind(
        addr,
        ExporterState {
            store,
            config: config.clone(),
        },
    )
    .await
    .context("Failed to start metrics server")?;

    let coordinator = ShutdownCoordinator::new();

    let scheduler_task = tokio::spawn({
        let listener = coordinator.listener();
        async move { scheduler.run(listener).await }
    });
    let sync_task = synchronizer.map(|sync| {
        let listener = coordinator.listener();
        tokio::spawn(async move { sync.run(listener).await })
    });
    let server_task = tokio::spawn(server.run(coordinator.listener()));

    let cleanup = async move {
        if let Err(e) = scheduler_task.await {
            error!(error = %e, "Scheduler task failed");
        }
        if let Some(task) = sync_task {
            if let Err(e) = task.await {
                error!(error = %e, "Configuration listener task failed");
            }
        }
        match server_task.await {
            Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
            Err(e) => error!(error = %e, "Metrics server task failed"),
            Ok(Ok(())) => {}
        }
    };

    let outcome = coordinator.run(signal_rx, cleanup).await;
    match outcome {
        ShutdownOutcome::Graceful => info!("domwatch stopped"),
        ShutdownOutcome::Forced => {
            warn!("domwatch forced to stop");
            std::process::exit(outcome.exit_code());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the level comes from configuration
/// and can be swapped at runtime through the returned handle.
fn init_tracing() -> (FilterHandle, bool) {
    let env_filter_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    (handle, env_filter_set)
}

fn apply_log_level(handle: &FilterHandle, level: LogLevel) {
    match handle.reload(EnvFilter::new(level.as_directive())) {
        Ok(()) => info!(level = %level, "Log level set"),
        Err(e) => warn!(error = %e, "Failed to update log level"),
    }
}

/// Runs `startup` unless a shutdown signal arrives first.
async fn unless_signalled<F: Future>(
    startup: F,
    signals: &mut mpsc::Receiver<ShutdownSignal>,
) -> Option<F::Output> {
    tokio::select! {
        output = startup => Some(output),
        Some(signal) = signals.recv() => {
            info!(?signal, "Shutdown requested during startup");
            None
        }
    }
}

/// Forwards OS signals into the shutdown coordinator's channel.
fn forward_signals(tx: mpsc::Sender<ShutdownSignal>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                    Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                    else => break,
                };
                if tx.send(received).await.is_err() {
                    break;
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                    break;
                }
            }
        });
    }

    Ok(())
}
