//! System status endpoint.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the system router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/status", get(get_status))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// System status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "version": "0.1.0",
    "started_at_utc": "2025-01-15T03:30:00+00:00",
    "uptime_secs": 3600,
    "bluetooth_available": true,
    "devices": 12,
    "visible_devices": 5,
    "max_devices": 50,
    "discovering": false
}))]
pub struct SystemStatusResponse {
    /// Server version.
    pub version: String,

    /// When the server started.
    pub started_at_utc: String,

    /// Server uptime in seconds.
    pub uptime_secs: u64,

    /// Whether the local BLE scanner is running.
    pub bluetooth_available: bool,

    /// Tracked devices.
    pub devices: usize,

    /// Visible devices.
    pub visible_devices: usize,

    /// Registry capacity.
    pub max_devices: usize,

    /// Whether discovery mode is on.
    pub discovering: bool,
}

// ============================================================================
// Uptime tracking
// ============================================================================

static SERVER_START: OnceLock<(Instant, DateTime<Utc>)> = OnceLock::new();

/// Records the server start time. Later calls are no-ops.
pub fn init_start_time() {
    SERVER_START.get_or_init(|| (Instant::now(), Utc::now()));
}

fn start_time() -> (Instant, DateTime<Utc>) {
    *SERVER_START.get_or_init(|| (Instant::now(), Utc::now()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Get system status.
#[utoipa::path(
    get,
    path = "/api/system/status",
    tag = "system",
    operation_id = "getSystemStatus",
    summary = "Get system status",
    description = "Returns version, uptime, scanner availability and registry counters.",
    responses(
        (status = 200, description = "System status retrieved", body = SystemStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<SystemStatusResponse> {
    let (started, started_at) = start_time();
    let stats = state.hub.stats().await;

    Json(SystemStatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at_utc: started_at.to_rfc3339(),
        uptime_secs: started.elapsed().as_secs(),
        bluetooth_available: state.bluetooth_available(),
        devices: stats.devices,
        visible_devices: stats.visible,
        max_devices: state.config.registry.max_devices,
        discovering: stats.discovering,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_time_is_stable() {
        init_start_time();
        let (first, _) = start_time();
        init_start_time();
        assert_eq!(first, start_time().0);
    }
}
