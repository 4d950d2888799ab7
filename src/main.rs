//! tcp-proxy: transparent TCP proxy with traffic inspection
//!
//! This is the main entry point for the tcp-proxy binary. It handles CLI
//! argument parsing, configuration loading and logging setup, then runs the
//! listener loop until the process is interrupted.
//!
//! # Exit Status
//!
//! Fatal configuration errors (unreadable config, unresolvable addresses,
//! bind failure, unusable TLS roots) exit non-zero before any connection is
//! accepted. Per-connection failures are only logged.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tcp_proxy::{
    cli::Cli,
    config::{ConfigLoader, Settings},
    proxy::ProxyServer,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    let settings = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;

    init_tracing(&settings)?;

    debug!("Resolved settings: {:?}", settings);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<()> {
    info!(
        "tcp-proxy ({}) proxying from {} to {}",
        env!("CARGO_PKG_VERSION"),
        settings.local,
        settings.remote
    );

    let server = ProxyServer::from_settings(&settings)
        .await
        .context("Failed to start proxy")?;

    if settings.unwrap_tls {
        info!("Remote connections will be TLS, exposed unencrypted locally");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so the accept loop keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await;
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// Lines go to stderr, and additionally to the log file when one is set.
///
/// # Verbosity Levels
/// - default: Info level (`RUST_LOG` is honoured)
/// - verbose (-v): Debug level for this crate, info elsewhere
/// - very verbose (--vv): Trace level for this crate, info elsewhere
fn init_tracing(settings: &Settings) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if settings.color {
        colored::control::set_override(true);
    }

    let filter = match settings.log_options().filter_directives() {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let file_layer = match settings.log_file {
        Some(ref path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(settings.color)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}
