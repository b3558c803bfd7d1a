//! HTTP API routes and handlers.
//!
//! Endpoints are organized by domain:
//! - `devices` - Registry snapshot, visibility and display settings
//! - `satellite` - Advertisement ingestion from relays
//! - `discovery` - Discovery mode control
//! - `health` / `system` - Service health and status
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod devices;
pub mod discovery;
pub mod error;
pub mod health;
pub mod openapi;
pub mod satellite;
pub mod system;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /docs                  - Swagger UI
/// /api
/// ├── /devices           - Snapshot, visibility, settings
/// ├── /satellite         - Relay ingestion
/// ├── /discovery         - Discovery mode
/// ├── /system            - System status
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    system::init_start_time();

    // Browser dashboards on other origins read the API directly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/devices", devices::router())
                .nest("/satellite", satellite::router())
                .nest("/discovery", discovery::router())
                .nest("/system", system::router()),
        )
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
