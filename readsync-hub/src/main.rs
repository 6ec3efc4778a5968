//! Session Hub (readsync-hub) - Main entry point
//!
//! Central synchronization server for classroom reading sessions. Owns the
//! per-session event logs, ingests student progress reports, and fans them
//! out to dashboards over SSE.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readsync_hub::config::HubConfig;
use readsync_hub::{build_router, AppState};

/// Command-line arguments for readsync-hub
#[derive(Parser, Debug)]
#[command(name = "readsync-hub")]
#[command(about = "Session Hub for classroom reading synchronization")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "READSYNC_HUB_PORT")]
    port: Option<u16>,

    /// Host address to bind (overrides config file)
    #[arg(long, env = "READSYNC_HUB_HOST")]
    host: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, env = "READSYNC_HUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readsync_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!(
        "Starting ReadSync Session Hub v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration, CLI flags win over the file
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            HubConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => HubConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    // Build shared state and router
    let state = AppState::from_config(&config);
    let registry = state.registry.clone();
    let app = build_router(state);

    // Retention sweeper for ended sessions
    let sweeper_registry = registry.clone();
    let sweep_interval = std::time::Duration::from_secs(config.retention.sweep_interval_secs);
    let retention = chrono::Duration::seconds(config.retention.ended_ttl_secs as i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        // First tick completes immediately, skip it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = sweeper_registry.sweep(retention, Utc::now()).await;
            if pruned > 0 {
                info!(pruned, "retention sweep pruned ended sessions");
            }
        }
    });

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("readsync-hub listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    // The registry must shut down before the drain: subscribed feeds only
    // close after session_end, and serve waits for every stream to finish
    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_registry.shutdown(Utc::now()).await;
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
