//! # parley-server
//!
//! Real-time chat hub.
//!
//! This binary provides:
//! - **WebSocket sessions** for authenticated users, one live connection per
//!   user, each with a bounded outbound queue
//! - **Direct and group messaging** with per-recipient translation and
//!   offline replay of undelivered direct messages
//! - **REST API** (axum) for health, delivery stats, and presence

mod api;
mod config;
mod connection;
mod error;
mod hub;
mod names;
mod pipeline;
mod registry;
mod roster;
mod router;
mod stats;
mod translate;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_store::SqliteStore;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::{Hub, HubStores};
use crate::translate::TaggingProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley chat hub v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and build the hub
    // -----------------------------------------------------------------------
    let store = SqliteStore::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "Message store ready");

    let hub = Arc::new(Hub::new(
        config.hub(),
        HubStores::sqlite(store),
        Arc::new(TaggingProvider),
    ));

    // A failed load leaves the roster empty; joins repopulate it.
    if let Err(e) = hub.load_groups().await {
        warn!(error = %e, "Failed to load groups, starting with an empty roster");
    }

    // -----------------------------------------------------------------------
    // 4. Run the HTTP + WebSocket server until Ctrl+C
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let app_state = AppState {
        hub: hub.clone(),
        config: Arc::new(config),
    };

    let shutdown_hub = hub.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
        shutdown_hub.shutdown();
    };

    if let Err(e) = api::serve(app_state, http_addr, shutdown).await {
        tracing::error!(error = %e, "HTTP server failed");
        return Err(e);
    }

    info!("Server stopped");
    Ok(())
}
