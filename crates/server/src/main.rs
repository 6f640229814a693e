use anyhow::{anyhow, Result};
use axum::serve;
use clap::{Parser, Subcommand};
use gateway_core::{
    config::AppConfig, metrics::MetricsCollector, proxy::Gateway, runtime::ConfigHandle,
};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::router;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, signal, task::JoinHandle};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "JSON-RPC gateway for Ethereum node endpoints")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Start {
        /// Configuration file, defaults to `GATEWAY_CONFIG` or `config/config.toml`
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the gateway version
    Version,
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &AppConfig) {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,gateway_core={level},server={level}")));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start { config: None }) {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Start { config } => start(config).await,
    }
}

async fn start(config_path: Option<PathBuf>) -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config_path = config_path
        .map_or_else(AppConfig::config_path, |path| path.to_string_lossy().into_owned());

    let config = AppConfig::from_file(&config_path)
        .map_err(|e| anyhow!("Failed to load configuration from {config_path}: {e}"))?;
    config.validate().map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);

    info!(
        config_path = %config_path,
        strategy = %config.gateway.strategy,
        upstreams = config.gateway.upstreams.len(),
        method_limitation_enabled = config.gateway.method_limitation_enabled,
        "Starting JSON-RPC gateway"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let handle = Arc::new(
        ConfigHandle::new(&config.gateway, config.timings.clone(), metrics)
            .map_err(|e| anyhow!("Failed to build running configuration: {e}"))?,
    );

    let app = router::create_app(Gateway::new(Arc::clone(&handle)), &config);

    let bind_addr: SocketAddr = config.socket_addr().map_err(|e| anyhow!(e))?;
    let listener = TcpListener::bind(bind_addr).await?;

    info!(address = %bind_addr, "Gateway listening");

    let reload_task = spawn_reload_on_hangup(Arc::clone(&handle), config_path);

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
    }

    if let Some(task) = reload_task {
        task.abort();
    }
    handle.shutdown();

    info!("Gateway shutdown complete");
    Ok(())
}

/// Rebuilds the running configuration from `config_path` on every `SIGHUP`.
///
/// A file that fails to load, validate or build leaves the live configuration in
/// place.
#[cfg(unix)]
fn spawn_reload_on_hangup(handle: Arc<ConfigHandle>, config_path: String) -> Option<JoinHandle<()>> {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, hot reload disabled");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!(config_path = %config_path, "SIGHUP received, reloading configuration");

            let config = match AppConfig::from_file(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    error!(error = %e, "Failed to load configuration, keeping current one");
                    continue;
                }
            };

            if let Err(e) = config.validate() {
                error!(error = %e, "Invalid configuration, keeping current one");
                continue;
            }

            if let Err(e) = handle.reload(&config.gateway) {
                error!(error = %e, "Failed to build configuration, keeping current one");
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_handle: Arc<ConfigHandle>, _config_path: String) -> Option<JoinHandle<()>> {
    None
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
