//! Device query and settings endpoints.
//!
//! Devices are addressed by their MAC in `AA:BB:CC:DD:EE:FF` form. Every
//! mutation is persisted by the hub before the response is sent.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thermohub_core::{DeviceView, MacAddress, SettingsUpdate};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/visibility/clear", post(clear_visibility))
        .route("/{mac}/visibility", put(set_visibility))
        .route("/{mac}/toggle", post(toggle_visibility))
        .route("/{mac}/settings", put(update_settings))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the device listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListDevicesQuery {
    /// Include devices that are not marked visible.
    #[serde(default)]
    pub include_hidden: bool,
}

/// Device listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceListResponse {
    /// Devices in address order.
    pub devices: Vec<DeviceView>,

    /// Number of devices returned.
    #[schema(example = 3)]
    pub count: usize,

    /// Whether discovery mode is on.
    #[schema(example = false)]
    pub discovering: bool,

    /// When the snapshot was taken.
    #[schema(example = "2025-01-15T03:30:00+00:00")]
    pub generated_at_utc: String,
}

/// Visibility change request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "visible": true }))]
pub struct VisibilityRequest {
    /// Whether the device appears on the default listing.
    pub visible: bool,
}

/// Visibility after a change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "address": "A4:C1:38:0A:1B:2C", "visible": true }))]
pub struct VisibilityResponse {
    /// Device address.
    pub address: String,

    /// Visibility now in effect.
    pub visible: bool,
}

/// Display settings request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Sauna",
    "show_mac": true,
    "show_ip": false,
    "field_mask": 3,
    "propagate": true
}))]
pub struct UpdateSettingsRequest {
    /// New name for this device only. Empty clears the operator name.
    #[serde(default)]
    pub name: Option<String>,

    /// Show the MAC address.
    pub show_mac: bool,

    /// Show the relay IP.
    pub show_ip: bool,

    /// Displayed-field bitmask.
    pub field_mask: u16,

    /// Also apply the display flags to every device reporting the same
    /// sensor fields.
    #[serde(default)]
    pub propagate: bool,
}

/// Number of devices a settings change touched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "updated": 4 }))]
pub struct UpdateSettingsResponse {
    /// Devices updated, including the target.
    pub updated: usize,
}

/// Number of devices hidden by a bulk clear.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "cleared": 2 }))]
pub struct ClearVisibilityResponse {
    /// Devices that were visible before the call.
    pub cleared: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List tracked devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List tracked devices",
    description = "Returns a snapshot of the registry. Hidden devices are only \
        included with `include_hidden=true`, which is how newly discovered \
        devices are found before being made visible.",
    params(ListDevicesQuery),
    responses(
        (status = 200, description = "Snapshot taken", body = DeviceListResponse)
    )
)]
pub async fn list_devices(
    State(state): State<SharedState>,
    Query(query): Query<ListDevicesQuery>,
) -> Json<DeviceListResponse> {
    let devices = state.hub.snapshot(query.include_hidden).await;
    Json(DeviceListResponse {
        count: devices.len(),
        devices,
        discovering: state.hub.is_discovering().await,
        generated_at_utc: Utc::now().to_rfc3339(),
    })
}

/// Show or hide a device.
#[utoipa::path(
    put,
    path = "/api/devices/{mac}/visibility",
    tag = "devices",
    operation_id = "setDeviceVisibility",
    summary = "Set device visibility",
    params(("mac" = String, Path, description = "Device MAC address")),
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Visibility updated", body = VisibilityResponse),
        (status = 400, description = "Invalid MAC address", body = ErrorResponse),
        (status = 404, description = "Device not tracked", body = ErrorResponse)
    )
)]
pub async fn set_visibility(
    State(state): State<SharedState>,
    Path(mac): Path<String>,
    body: Result<Json<VisibilityRequest>, JsonRejection>,
) -> ApiResult<Json<VisibilityResponse>> {
    let address: MacAddress = mac.parse()?;
    let Json(request) = body?;
    let settings = state.hub.set_visibility(address, request.visible).await?;
    Ok(Json(VisibilityResponse {
        address: address.to_string(),
        visible: settings.visible,
    }))
}

/// Flip a device's visibility.
#[utoipa::path(
    post,
    path = "/api/devices/{mac}/toggle",
    tag = "devices",
    operation_id = "toggleDeviceVisibility",
    summary = "Toggle device visibility",
    params(("mac" = String, Path, description = "Device MAC address")),
    responses(
        (status = 200, description = "Visibility toggled", body = VisibilityResponse),
        (status = 400, description = "Invalid MAC address", body = ErrorResponse),
        (status = 404, description = "Device not tracked", body = ErrorResponse)
    )
)]
pub async fn toggle_visibility(
    State(state): State<SharedState>,
    Path(mac): Path<String>,
) -> ApiResult<Json<VisibilityResponse>> {
    let address: MacAddress = mac.parse()?;
    let settings = state.hub.toggle_visibility(address).await?;
    Ok(Json(VisibilityResponse {
        address: address.to_string(),
        visible: settings.visible,
    }))
}

/// Update display settings.
#[utoipa::path(
    put,
    path = "/api/devices/{mac}/settings",
    tag = "devices",
    operation_id = "updateDeviceSettings",
    summary = "Update device display settings",
    description = "Sets the name and display flags of a device. With \
        `propagate=true` the display flags (never the name) are copied to every \
        device reporting the same set of sensor fields.",
    params(("mac" = String, Path, description = "Device MAC address")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = UpdateSettingsResponse),
        (status = 400, description = "Invalid MAC address or body", body = ErrorResponse),
        (status = 404, description = "Device not tracked", body = ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Path(mac): Path<String>,
    body: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateSettingsResponse>> {
    let address: MacAddress = mac.parse()?;
    let Json(request) = body?;
    let update = SettingsUpdate {
        name: request.name,
        show_mac: request.show_mac,
        show_ip: request.show_ip,
        field_mask: request.field_mask,
    };
    let updated = state
        .hub
        .update_settings(address, &update, request.propagate)
        .await?;
    Ok(Json(UpdateSettingsResponse { updated }))
}

/// Hide every device.
#[utoipa::path(
    post,
    path = "/api/devices/visibility/clear",
    tag = "devices",
    operation_id = "clearDeviceVisibility",
    summary = "Hide all devices",
    description = "Marks every device hidden without forgetting it. Hidden \
        devices keep updating RSSI and interval statistics.",
    responses(
        (status = 200, description = "Visibility cleared", body = ClearVisibilityResponse)
    )
)]
pub async fn clear_visibility(State(state): State<SharedState>) -> Json<ClearVisibilityResponse> {
    Json(ClearVisibilityResponse {
        cleared: state.hub.clear_visibility().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_request_defaults() {
        let request: UpdateSettingsRequest =
            serde_json::from_str(r#"{"show_mac":true,"show_ip":false,"field_mask":3}"#).unwrap();
        assert!(request.name.is_none());
        assert!(!request.propagate);
    }

    #[test]
    fn test_list_query_default_hides() {
        assert!(!ListDevicesQuery::default().include_hidden);
    }
}
