//! Dockpay Service - payment webhooks and Stripe checkout
//!
//! This is the main entry point for the dockpay service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dockpay_service::{create_router, AppState, MerchantRegistry, ServiceConfig};
use dockpay_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dockpay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dockpay Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        paypal_configured = %config.paypal_webhook_id.is_some(),
        stripe_configured = %config.stripe_api_key.is_some(),
        sendgrid_configured = %config.sendgrid_api_key.is_some(),
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    let merchants = match &config.merchants_file {
        Some(path) => {
            tracing::info!(path = %path, "Loading merchants");
            MerchantRegistry::load(path)?
        }
        None => {
            tracing::warn!("MERCHANTS_FILE not set - no merchants configured");
            MerchantRegistry::default()
        }
    };

    // Build app state
    let state = AppState::new(store, config.clone(), merchants)?;

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(dockpay_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("Built without rocksdb-backend - ledger is held in memory only");
    Ok(Arc::new(dockpay_store::MemoryStore::new()))
}
