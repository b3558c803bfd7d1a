//! Discovery mode control.
//!
//! While discovery is on, any advertisement from an unseen address creates
//! a (hidden) device record. It is off by default so the tracked set only
//! grows when the operator asks for it.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the discovery router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_discovery))
        .route("/start", post(start_discovery))
        .route("/stop", post(stop_discovery))
}

/// Discovery mode state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "discovering": true, "devices": 7 }))]
pub struct DiscoveryResponse {
    /// Whether discovery mode is on.
    pub discovering: bool,

    /// Devices tracked right now.
    pub devices: usize,
}

async fn discovery_response(state: &SharedState) -> Json<DiscoveryResponse> {
    let stats = state.hub.stats().await;
    Json(DiscoveryResponse {
        discovering: stats.discovering,
        devices: stats.devices,
    })
}

/// Get discovery mode state.
#[utoipa::path(
    get,
    path = "/api/discovery",
    tag = "discovery",
    operation_id = "getDiscovery",
    summary = "Get discovery mode",
    responses(
        (status = 200, description = "Current discovery state", body = DiscoveryResponse)
    )
)]
pub async fn get_discovery(State(state): State<SharedState>) -> Json<DiscoveryResponse> {
    discovery_response(&state).await
}

/// Turn discovery mode on.
#[utoipa::path(
    post,
    path = "/api/discovery/start",
    tag = "discovery",
    operation_id = "startDiscovery",
    summary = "Start discovery mode",
    responses(
        (status = 200, description = "Discovery started", body = DiscoveryResponse)
    )
)]
pub async fn start_discovery(State(state): State<SharedState>) -> Json<DiscoveryResponse> {
    state.hub.start_discovery().await;
    discovery_response(&state).await
}

/// Turn discovery mode off.
#[utoipa::path(
    post,
    path = "/api/discovery/stop",
    tag = "discovery",
    operation_id = "stopDiscovery",
    summary = "Stop discovery mode",
    responses(
        (status = 200, description = "Discovery stopped", body = DiscoveryResponse)
    )
)]
pub async fn stop_discovery(State(state): State<SharedState>) -> Json<DiscoveryResponse> {
    state.hub.stop_discovery().await;
    discovery_response(&state).await
}
