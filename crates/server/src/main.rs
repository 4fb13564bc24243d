//! Firmware builder server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use mtfw_core::config::AppConfig;
use mtfw_server::sweeper::{run_sweep, spawn_periodic_sweep};
use mtfw_server::{AppState, create_router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MTFW Builder - custom Meshtastic firmware builds
#[derive(Parser, Debug)]
#[command(name = "mtfwd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "MTFW_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration: optional TOML file, then `MTFW_` environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("MTFW_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("MTFW Builder v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    mtfw_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    tokio::fs::create_dir_all(&config.paths.temp_root)
        .await
        .with_context(|| {
            format!(
                "failed to create temp root {}",
                config.paths.temp_root.display()
            )
        })?;
    tracing::info!(temp_root = %config.paths.temp_root.display(), "Request directory ready");

    let state = AppState::new(config.clone()).context("failed to initialize build service")?;

    // Reclaim anything a previous process left behind.
    let stats = run_sweep(&state.sweeper).await;
    tracing::info!(
        builds_removed = stats.builds_removed,
        tree_files_removed = stats.tree_files_removed,
        "Startup cleanup finished"
    );

    let shutdown = CancellationToken::new();
    let sweep_handle = spawn_periodic_sweep(
        state.sweeper.clone(),
        config.retention.sweep_interval(),
        shutdown.clone(),
    );
    let _watchdog = state.tasks.clone().spawn_watchdog(Duration::from_secs(10));

    let app = create_router(state);
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweep_handle.await {
        tracing::warn!(error = %e, "Periodic cleanup task ended abnormally");
    }
    Ok(())
}
