//! OpenAPI specification generation for the thermohub API.
//!
//! The document is served at `/api/openapi.json`, rendered by Swagger UI at
//! `/docs`, and written to disk by the `gen-openapi` binary for client
//! generation.

use axum::Json;
use thermohub_core::{DeviceView, FirmwareKind, IntervalStats, SatelliteMessage};
use utoipa::OpenApi;

use super::devices::{
    ClearVisibilityResponse, DeviceListResponse, UpdateSettingsRequest, UpdateSettingsResponse,
    VisibilityRequest, VisibilityResponse,
};
use super::discovery::DiscoveryResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::satellite::SatelliteAck;
use super::system::SystemStatusResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for thermohub.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "thermohub API",
        version = "0.1.0",
        description = r#"
# thermohub API

thermohub collects readings from cheap BLE thermometers (Xiaomi LYWSD03MMC
and friends running pvvx or atc1441 firmware, stock MiBeacon sensors and
BTHome v2 devices) and keeps a small registry of the ones you care about.

## Overview

1. **Local scanning**: the hub listens for advertisements on its own adapter
2. **Satellite relays**: remote relays POST raw advertisements to `/api/satellite`
3. **Discovery**: unknown devices are only registered while discovery is on
4. **Display settings**: names, visibility and field masks persist across restarts

## Finding a new sensor

- `POST /api/discovery/start`
- `GET /api/devices?include_hidden=true` and look for the new address
- `PUT /api/devices/{mac}/visibility` with `{"visible": true}`
- `POST /api/discovery/stop`
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local thermohub server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and system status"
        ),
        (
            name = "devices",
            description = "Tracked devices, visibility and display settings"
        ),
        (
            name = "satellite",
            description = "Advertisement ingestion from satellite relays"
        ),
        (
            name = "discovery",
            description = "Discovery mode for registering new devices"
        )
    ),
    paths(
        super::health::health_check,
        super::system::get_status,
        super::devices::list_devices,
        super::devices::set_visibility,
        super::devices::toggle_visibility,
        super::devices::update_settings,
        super::devices::clear_visibility,
        super::satellite::ingest,
        super::discovery::get_discovery,
        super::discovery::start_discovery,
        super::discovery::stop_discovery,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            SystemStatusResponse,
            // Devices
            DeviceListResponse,
            DeviceView,
            FirmwareKind,
            IntervalStats,
            VisibilityRequest,
            VisibilityResponse,
            UpdateSettingsRequest,
            UpdateSettingsResponse,
            ClearVisibilityResponse,
            // Ingestion
            SatelliteMessage,
            SatelliteAck,
            DiscoveryResponse,
        )
    )
)]
pub struct ApiDoc;
