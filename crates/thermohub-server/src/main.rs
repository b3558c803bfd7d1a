//! # thermohub-server
//!
//! HTTP server for thermohub.
//!
//! This binary provides:
//! - Satellite ingestion and device registry REST API
//! - Optional local BLE scanning (`bluetooth` feature)
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, relays only
//! cargo run --package thermohub-server
//!
//! # With the local scanner (needs BlueZ)
//! cargo run --package thermohub-server --features bluetooth
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use thermohub_core::{Hub, HubConfig, JsonFileStore};
use thermohub_server::{create_router, logging, AppState, SharedState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HubConfig::from_env_or_default().context("failed to load configuration")?;
    logging::init(config.server.production)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting thermohub-server");

    let settings_path = config.storage.resolved_settings_path();
    let store = JsonFileStore::open_or_recover(settings_path.clone());
    info!(path = %settings_path.display(), "Settings store opened");

    let hub = Arc::new(Hub::new(&config.registry, Arc::new(store)));
    match hub.restore().await {
        Ok(count) => info!(count, "Restored devices from settings store"),
        Err(e) => warn!(error = %e, "Failed to restore devices, starting empty"),
    }

    let addr = SocketAddr::new(config.server.bind, config.server.port);
    let state = AppState::new(Arc::clone(&hub), config).shared();
    spawn_scanner(&state);

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(feature = "bluetooth")]
fn spawn_scanner(state: &SharedState) {
    use thermohub_core::LocalScanner;

    if !state.config.scanner.enabled {
        info!("Local scanner disabled by configuration");
        return;
    }

    let state = Arc::clone(state);
    tokio::spawn(async move {
        let adapter = state.config.scanner.adapter.clone();
        let scanner = match LocalScanner::open(adapter.as_deref()).await {
            Ok(scanner) => scanner,
            Err(e) => {
                warn!(error = %e, "Local scanner unavailable, relying on satellites");
                return;
            }
        };
        state.set_bluetooth_available(true);
        if let Err(e) = scanner.run(Arc::clone(&state.hub)).await {
            warn!(error = %e, "Local scanner stopped");
        }
        state.set_bluetooth_available(false);
    });
}

#[cfg(not(feature = "bluetooth"))]
fn spawn_scanner(state: &SharedState) {
    if state.config.scanner.enabled {
        info!("Built without the bluetooth feature, local scanner disabled");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
