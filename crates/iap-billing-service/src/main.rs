//! iap-billing Service - HTTP API for post-purchase receipt verification
//!
//! This is the main entry point for the iap-billing service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iap_billing_service::worker::spawn_queue_ticker;
use iap_billing_service::{create_router, AppState, ServiceConfig};
use iap_billing_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,iap_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting iap-billing service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        apple_production_url = %config.apple_production_url,
        apple_secret_configured = %config.apple_shared_secret.is_some(),
        cron_secret_configured = %config.cron_secret.is_some(),
        queue_batch_size = config.queue_batch_size,
        queue_poll_seconds = ?config.queue_poll_seconds,
        "Service configuration loaded"
    );

    let store = open_store(&config.data_dir)?;

    // Build app state
    let state = AppState::new(store, config.clone())?;

    if let Some(seconds) = config.queue_poll_seconds {
        tracing::info!(every_seconds = seconds, "Starting in-process queue ticker");
        spawn_queue_ticker(Arc::new(state.clone()), Duration::from_secs(seconds));
    }

    // Create the router
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(data_dir: &str) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    Ok(Arc::new(iap_billing_store::RocksStore::open(data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(data_dir: &str) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!(
        path = %data_dir,
        "Built without rocksdb-backend - using in-memory store, data is lost on restart"
    );
    Ok(Arc::new(iap_billing_store::MemoryStore::new()))
}
