//! # thermohub-core
//!
//! Core logic for the thermohub BLE thermometer hub.
//!
//! This crate provides:
//! - Decoders for pvvx, atc1441, MiBeacon and BTHome v2 advertisements
//! - A device registry with discovery mode and persisted per-device settings
//! - Ingestion of local radio scans and satellite relay submissions
//! - Configuration loading and validation
//!
//! ## Architecture
//!
//! - [`advertisement`] - Raw AD-structure parsing and encoding
//! - [`decoder`] - Per-firmware sensor payload decoders
//! - [`registry`] - Device records, merge policy and query views
//! - [`ingest`] - Normalizing local and satellite input into observations
//! - [`store`] - Settings key-value store and its backends
//! - [`hub`] - The shared service tying registry and store together
//! - [`config`] - Application configuration
//! - [`error`] - Unified error types for the crate
//! - [`types`] - MAC addresses and timestamps
//! - `bluetooth` - Local BlueZ scanner (feature `bluetooth`)

#![forbid(unsafe_code)]

pub mod advertisement;
#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod decoder;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod registry;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use advertisement::{AdvertisementBuilder, AdvertisementFields};
#[cfg(feature = "bluetooth")]
pub use bluetooth::LocalScanner;
pub use config::{ConfigError, ConfigResult, HubConfig};
pub use decoder::{decode_service_data, FirmwareKind, Rejection, SensorReading};
pub use error::{HubError, Result};
pub use hub::{Hub, HubStats};
pub use ingest::{LocalAdvertisement, SatelliteError, SatelliteMessage};
pub use registry::{
    DeviceRegistry, DeviceView, IntervalStats, ObservationStatus, SettingsUpdate, Source,
};
pub use store::{DeviceSettings, JsonFileStore, MemoryStore, SettingsStore, StoreError};
pub use types::{is_valid_mac_address, MacAddress, Timestamp};
