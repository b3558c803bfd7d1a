//! Satellite relay ingestion.
//!
//! Relays POST one JSON message per captured advertisement. The relay's IP
//! is taken from the connection's peer address, not from the body.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thermohub_core::registry::DropReason;
use thermohub_core::{ObservationStatus, SatelliteMessage};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the satellite router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(ingest))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "status": "updated" }))]
pub struct SatelliteAck {
    /// `created`, `updated`, `liveness_only`, `ignored` (unknown device
    /// outside discovery) or `capacity_reached`.
    pub status: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept one relayed advertisement.
#[utoipa::path(
    post,
    path = "/api/satellite",
    tag = "satellite",
    operation_id = "ingestSatellite",
    summary = "Submit a relayed advertisement",
    description = "Accepts one raw advertisement captured by a satellite relay. \
        The payload is decoded exactly like a local scan. Unknown devices are \
        only registered while discovery mode is on; otherwise the submission \
        is accepted and ignored.",
    request_body = SatelliteMessage,
    responses(
        (status = 202, description = "Submission accepted", body = SatelliteAck),
        (status = 400, description = "Malformed MAC, hex payload or body", body = ErrorResponse)
    )
)]
pub async fn ingest(
    State(state): State<SharedState>,
    extensions: Extensions,
    body: Result<Json<SatelliteMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SatelliteAck>)> {
    let Json(message) = body?;
    let ip = peer_ip(&extensions);
    let status = state.hub.ingest_satellite(&message, &ip).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SatelliteAck {
            status: status_label(status).to_string(),
        }),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn peer_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

const fn status_label(status: ObservationStatus) -> &'static str {
    match status {
        ObservationStatus::Created => "created",
        ObservationStatus::Updated => "updated",
        ObservationStatus::LivenessOnly => "liveness_only",
        ObservationStatus::Dropped(DropReason::UnknownDevice) => "ignored",
        ObservationStatus::Dropped(DropReason::CapacityReached) => "capacity_reached",
    }
}
