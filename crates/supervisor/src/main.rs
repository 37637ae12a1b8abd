//! Playback Supervisor - standalone headless 24/7 supervisor for an
//! embedded media-playback surface.
//!
//! Binds a loopback-only HTTP listener exposing the player duplex socket
//! (`/ws`) and a small admin surface (`/healthz`, `/status`,
//! `/admin/reload`, `/admin/restart`), and runs the recovery engine, host
//! client, and notifier for the lifetime of the process.

mod admin;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use supervisor_core::protocol_constants::EXIT_CODE_RESTART;
use supervisor_core::Supervisor;
use tokio::net::TcpListener;
use tokio::signal;

use crate::admin::AdminState;

/// Headless supervisor for an embedded media-playback surface.
#[derive(Parser, Debug)]
#[command(name = "playback-supervisor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "SUPERVISOR_CONFIG")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SUPERVISOR_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Playback Supervisor v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load(&args.config).context("Failed to load configuration")?;

    log::info!(
        "Configuration: bindAddr={}, stateFile={}, playlists={}",
        config.bind_addr,
        config.state_file.display(),
        config.playlists.len()
    );

    let supervisor = Arc::new(Supervisor::new(&config).context("Failed to bootstrap services")?);

    let api_token = supervisor.api_token().await;
    log::info!(
        "Admin surface listening on {} — mutating requests require header `x-api-token: {}`",
        config.bind_addr,
        api_token
    );

    let admin_state = AdminState {
        supervisor: Arc::clone(&supervisor),
        config_path: args.config.clone(),
    };
    let router = supervisor.router().await.merge(admin::router(admin_state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router.into_make_service()).await {
            log::error!("HTTP server error: {e}");
        }
    });

    log::info!("Supervisor running. Ctrl-C to stop, SIGHUP to reload config.");

    run_until_shutdown(&supervisor, &args.config).await;

    server_handle.abort();
    log::info!("Shutdown complete");
    Ok(())
}

/// Multiplexes the process's shutdown and reload signals for the lifetime
/// of the supervisor. Returns once a clean shutdown has been requested;
/// a restart request exits the process directly with [`EXIT_CODE_RESTART`]
/// (mirroring `triggerRestart()`, §4.6) rather than returning, since a
/// launcher wrapper is expected to relaunch on that exit code.
async fn run_until_shutdown(supervisor: &Arc<Supervisor>, config_path: &PathBuf) {
    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                log::info!("Shutdown signal received, flushing state and closing sockets...");
                supervisor.shutdown().await;
                return;
            }
            _ = reload_signal() => {
                log::info!("Reload signal received, reloading configuration...");
                match config::load(config_path) {
                    Ok(new_config) => match supervisor.reload_config(&new_config).await {
                        Ok(()) => log::info!("Configuration reloaded"),
                        Err(e) => log::error!("Config reload failed, keeping prior config live: {e}"),
                    },
                    Err(e) => log::error!("Config reload rejected (keeping prior config live): {e}"),
                }
            }
            _ = restart_signal() => {
                log::warn!("Restart signal received, exiting {EXIT_CODE_RESTART} for launcher relaunch");
                supervisor.shutdown().await;
                std::process::exit(EXIT_CODE_RESTART);
            }
        }
    }
}

/// Waits for a clean-shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Waits for the config-reload signal (SIGHUP on Unix; never fires elsewhere).
async fn reload_signal() {
    #[cfg(unix)]
    {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect("Failed to install SIGHUP handler")
            .recv()
            .await;
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

/// Waits for the restart-trigger signal (SIGUSR1 on Unix; never fires elsewhere).
async fn restart_signal() {
    #[cfg(unix)]
    {
        signal::unix::signal(signal::unix::SignalKind::user_defined1())
            .expect("Failed to install SIGUSR1 handler")
            .recv()
            .await;
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}
