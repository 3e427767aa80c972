//! Quantitea Binary Entry Point
//!
//! This binary runs the metric store, the daily reset scheduler and the HTTP API.
//! Core functionality is provided by the `quantitea` library crate.

use clap::Parser;
use quantitea::{
    DailyResetScheduler, MetricExporter, StorageHandles,
    config::AppConfig,
    server::{AppState, create_router},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quantitea - Personal Metric Tracker
#[derive(Parser, Debug)]
#[command(name = "quantitea", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, env = "QUANTITEA_CONFIG")]
    config: Option<String>,

    /// Database path (overrides config file)
    #[arg(long, env = "QUANTITEA_DB")]
    db: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "QUANTITEA_BIND")]
    bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "QUANTITEA_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quantitea=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Quantitea - Personal Metric Tracker");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    match &cli.config {
        Some(path) => tracing::info!("Loading configuration from: {}", path),
        None => tracing::info!("No configuration file given, using defaults"),
    }
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.path,
    );

    // Build storage layer
    let handles = config.database.storage_builder().build().await?;
    tracing::info!("Storage initialized");

    // Start the daily reset scheduler
    let scheduler = if config.reset.enabled {
        Some(DailyResetScheduler::start(
            handles.store.clone(),
            config.reset.schedule()?,
        ))
    } else {
        tracing::info!("Daily reset disabled");
        None
    };

    // Create web server state
    let exporter = if config.exporter.enabled {
        Some(Arc::new(MetricExporter::new(handles.store.clone())?))
    } else {
        None
    };
    let app_state = AppState {
        store: handles.store.clone(),
        exporter,
    };

    // Build Axum router
    let app = create_router(app_state);

    // Resolve bind address
    let addr = config.server.socket_addr()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown(scheduler, handles).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

/// Stop the scheduler, then close storage.
async fn shutdown(scheduler: Option<DailyResetScheduler>, handles: StorageHandles) {
    if let Some(scheduler) = scheduler {
        tracing::info!("Shutting down daily reset scheduler...");
        scheduler.shutdown().await;
    }

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }
}
