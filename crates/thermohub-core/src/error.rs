//! Unified error types for the thermohub core library.
//!
//! Runtime modules keep their own narrow error type ([`StoreError`],
//! [`SatelliteError`]) and convert into [`HubError`], which carries the
//! HTTP mapping used by the server. Configuration errors stay in
//! [`ConfigError`]; they only occur at startup and never reach a handler.
//!
//! Decoder rejections are not part of this hierarchy: a
//! payload that is not a thermometer is an ordinary outcome, not a failure.
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`StoreError`]: crate::store::StoreError
//! [`SatelliteError`]: crate::ingest::SatelliteError

use thiserror::Error;

use crate::types::MacAddress;

/// The unified error type for all thermohub operations.
#[derive(Debug, Error)]
pub enum HubError {
    // =========================================================================
    // REGISTRY ERRORS
    // =========================================================================
    /// No record exists for the address.
    #[error("Device not found: {0}. Enable discovery so the hub can learn it.")]
    DeviceNotFound(MacAddress),

    /// A MAC address string could not be parsed.
    #[error("Invalid device address: '{0}'. Expected XX:XX:XX:XX:XX:XX.")]
    InvalidAddress(String),

    // =========================================================================
    // INGESTION ERRORS
    // =========================================================================
    /// A satellite submission could not be parsed and was dropped.
    #[error("Malformed satellite payload: {0}")]
    MalformedSatellitePayload(String),

    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// The local radio could not be used.
    #[error("Bluetooth unavailable: {0}")]
    BluetoothUnavailable(String),

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// The settings store could not be read or written.
    #[error("Settings store error: {0}")]
    StoreError(String),
}

/// A specialized [`Result`] type for thermohub operations.
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Returns `true` if this error concerns registry contents.
    #[inline]
    #[must_use]
    pub const fn is_registry_error(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_) | Self::InvalidAddress(_))
    }

    /// Returns `true` if the settings store failed.
    #[inline]
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::StoreError(_))
    }

    /// Returns `true` for bad input from a client or relay, as opposed to a
    /// fault on this side.
    #[inline]
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::MalformedSatellitePayload(_) | Self::DeviceNotFound(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidAddress(_) | Self::MalformedSatellitePayload(_) => 400,
            Self::DeviceNotFound(_) => 404,
            Self::StoreError(_) => 500,
            Self::BluetoothUnavailable(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::MalformedSatellitePayload(_) => "MALFORMED_SATELLITE_PAYLOAD",
            Self::BluetoothUnavailable(_) => "BLUETOOTH_UNAVAILABLE",
            Self::StoreError(_) => "STORE_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::store::StoreError> for HubError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::StoreError(err.to_string())
    }
}

impl From<crate::ingest::SatelliteError> for HubError {
    fn from(err: crate::ingest::SatelliteError) -> Self {
        Self::MalformedSatellitePayload(err.to_string())
    }
}

impl From<crate::types::InvalidMacAddress> for HubError {
    fn from(err: crate::types::InvalidMacAddress) -> Self {
        Self::InvalidAddress(err.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        MacAddress::new([0xA4, 0xC1, 0x38, 0x01, 0x02, 0x03])
    }

    #[test]
    fn test_registry_error_classification() {
        assert!(HubError::DeviceNotFound(mac()).is_registry_error());
        assert!(HubError::InvalidAddress("nope".into()).is_registry_error());
        assert!(!HubError::StoreError("x".into()).is_registry_error());
    }

    #[test]
    fn test_store_error_classification() {
        assert!(HubError::StoreError("disk full".into()).is_store_error());
        assert!(!HubError::InvalidAddress("x".into()).is_store_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(HubError::MalformedSatellitePayload("odd hex".into()).is_client_error());
        assert!(!HubError::BluetoothUnavailable("off".into()).is_client_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(HubError::InvalidAddress("x".into()).http_status_code(), 400);
        assert_eq!(
            HubError::MalformedSatellitePayload("x".into()).http_status_code(),
            400
        );
        assert_eq!(HubError::DeviceNotFound(mac()).http_status_code(), 404);
        assert_eq!(HubError::StoreError("x".into()).http_status_code(), 500);
        assert_eq!(
            HubError::BluetoothUnavailable("x".into()).http_status_code(),
            503
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(HubError::DeviceNotFound(mac()).error_code(), "DEVICE_NOT_FOUND");
        assert_eq!(
            HubError::MalformedSatellitePayload("x".into()).error_code(),
            "MALFORMED_SATELLITE_PAYLOAD"
        );
    }

    #[test]
    fn test_from_invalid_mac() {
        let err: HubError = "zz".parse::<MacAddress>().unwrap_err().into();
        assert!(matches!(err, HubError::InvalidAddress(ref s) if s == "zz"));
    }

    #[test]
    fn test_error_display_messages() {
        let err = HubError::DeviceNotFound(mac());
        assert!(err.to_string().contains("A4:C1:38:01:02:03"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<HubError>();
        assert_sync::<HubError>();
    }
}
