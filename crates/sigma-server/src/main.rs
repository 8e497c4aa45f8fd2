//! Sigma server - server-rendered components with SSE push.

use anyhow::Result;
use clap::Parser;
use sigma_server::{adapter, config::Config, logging, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use logging::{LogConfig, LogFormat};

/// Sigma server - serves the demo components over HTTP and SSE.
#[derive(Parser, Debug)]
#[command(name = "sigma-server")]
#[command(about = "Server-rendered HTML components with live SSE updates")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override bind address from config
    #[arg(long)]
    host: Option<String>,

    /// Override the push interval in milliseconds
    #[arg(long, value_name = "MS")]
    push_interval: Option<u64>,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "stream=debug").
    /// Can be specified multiple times. Targets are prefixed with "sigma::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(ms) = cli.push_interval {
        config.push_interval_ms = ms;
    }
    tracing::info!(
        target: "sigma::startup",
        "Loaded configuration (port: {}, push interval: {:?})",
        config.port,
        config.push_interval()
    );

    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(
        target: "sigma::startup",
        "Initialized {} routes",
        state.sigma.routes().len()
    );

    let app = adapter::router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "sigma::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await?;

    tracing::info!(target: "sigma::startup", "Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, closing open streams so graceful shutdown can finish.
async fn shutdown(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "sigma::startup", "Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    state.begin_shutdown();
}
