//! Application state shared across handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thermohub_core::{Hub, HubConfig};

/// State handle given to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
///
/// The hub does its own locking, so the state itself is immutable apart
/// from the scanner flag.
#[derive(Debug)]
pub struct AppState {
    /// Registry and settings store.
    pub hub: Arc<Hub>,
    /// Configuration the server was started with.
    pub config: HubConfig,
    bluetooth_available: AtomicBool,
}

impl AppState {
    /// Creates state around an existing hub.
    #[must_use]
    pub const fn new(hub: Arc<Hub>, config: HubConfig) -> Self {
        Self {
            hub,
            config,
            bluetooth_available: AtomicBool::new(false),
        }
    }

    /// Wraps the state for sharing with the router.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Whether the local scanner is currently running.
    #[must_use]
    pub fn bluetooth_available(&self) -> bool {
        self.bluetooth_available.load(Ordering::Relaxed)
    }

    /// Records whether the local scanner is running.
    pub fn set_bluetooth_available(&self, available: bool) {
        self.bluetooth_available.store(available, Ordering::Relaxed);
    }
}
