//! # thermohub-server
//!
//! HTTP server library for thermohub.
//!
//! Provides the API router, shared state and logging setup used by the
//! `thermohub-server` binary and the integration tests.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

pub use api::create_router;
pub use state::{AppState, SharedState};
