//! traffic-control - traffic data orchestration service
//!
//! Startup order: settings, tracing, database, upstream clients, router.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traffic_common::db::init_database;

use traffic_control::config::Settings;
use traffic_control::db::MetadataIndex;
use traffic_control::services::{
    HttpOptimizationClient, HttpStorageClient, ProcessingPipeline, RetryPolicy,
};
use traffic_control::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    // LOG_LEVEL wins; RUST_LOG is the fallback when LOG_LEVEL is not a valid filter
    let filter = EnvFilter::try_new(settings.log_level.to_lowercase())
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting traffic-control v{}", env!("CARGO_PKG_VERSION"));

    settings.validate().context("Invalid configuration")?;
    info!(
        storage = %settings.storage_api_url,
        optimization = %settings.sync_api_url,
        min_sensors = settings.min_sensors_per_batch,
        max_sensors = settings.max_sensors_per_batch,
        "Configuration loaded"
    );

    let pool = match init_database(&settings.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let storage = HttpStorageClient::new(settings.storage_api_url.clone())
        .context("Failed to build storage client")?;
    let optimizer = HttpOptimizationClient::new(settings.sync_api_url.clone())
        .context("Failed to build optimization client")?;

    let pipeline = ProcessingPipeline::new(
        Arc::new(storage),
        Arc::new(optimizer),
        MetadataIndex::new(pool),
        settings.validation_limits(),
        RetryPolicy::default(),
    );
    let app = build_router(AppState::new(pipeline));

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("traffic-control listening on http://{}", address);
    info!("Health check: http://{}/healthcheck", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
