//! Sensor payload decoders for the supported thermometer firmwares.
//!
//! Every decoder is a pure function from a service-data block to either a
//! [`SensorReading`] or a [`Rejection`]. Rejection is the common case (most
//! advertisements on the air are not thermometers) and carries no payload
//! beyond a small reason tag.
//!
//! Service-data blocks are handed over exactly as they appear in the
//! advertisement: the first two bytes are the little-endian 16-bit service
//! UUID. The offsets documented in each submodule are relative to that
//! block, except for [`mibeacon`], whose frame layout is defined relative to
//! the bytes following the UUID.
//!
//! - [`pvvx`] - pvvx custom firmware (0x181A, 17+ bytes, little-endian)
//! - [`atc1441`] - atc1441 firmware (0x181A, 15-16 bytes, big-endian)
//! - [`mibeacon`] - stock Xiaomi MiBeacon (0xFE95), unencrypted only
//! - [`bthome`] - BTHome v2 (0xFCD2), unencrypted only

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub mod atc1441;
pub mod bthome;
pub mod mibeacon;
pub mod pvvx;

/// Environmental Sensing service, shared by pvvx and atc1441.
pub const ENVIRONMENTAL_SENSING_UUID: u16 = 0x181A;

/// Xiaomi MiBeacon service.
pub const MIBEACON_UUID: u16 = 0xFE95;

/// BTHome service.
pub const BTHOME_UUID: u16 = 0xFCD2;

/// Firmware family that produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareKind {
    /// pvvx custom format.
    Pvvx,
    /// atc1441 custom format.
    Atc1441,
    /// Stock Xiaomi MiBeacon.
    MiBeacon,
    /// BTHome version 2.
    BtHomeV2,
}

impl FirmwareKind {
    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pvvx => "pvvx",
            Self::Atc1441 => "atc1441",
            Self::MiBeacon => "MiBeacon",
            Self::BtHomeV2 => "BTHome v2",
        }
    }
}

/// A normalized sensor reading.
///
/// Only decoders construct readings, and only after finding a temperature or
/// a humidity value, so at least one of those two is always `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorReading {
    temperature: Option<f32>,
    humidity: Option<u8>,
    battery_pct: Option<u8>,
    battery_mv: Option<u16>,
    firmware: FirmwareKind,
}

impl SensorReading {
    /// Temperature in degrees Celsius.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Relative humidity, truncated to whole percent.
    #[must_use]
    pub const fn humidity(&self) -> Option<u8> {
        self.humidity
    }

    /// Battery level in percent.
    #[must_use]
    pub const fn battery_pct(&self) -> Option<u8> {
        self.battery_pct
    }

    /// Battery voltage in millivolts.
    #[must_use]
    pub const fn battery_mv(&self) -> Option<u16> {
        self.battery_mv
    }

    /// Firmware family that produced this reading.
    #[must_use]
    pub const fn firmware(&self) -> FirmwareKind {
        self.firmware
    }
}

/// Accumulates object-stream values; becomes a reading only if a
/// temperature or humidity value was seen.
#[derive(Debug, Default)]
pub(crate) struct ReadingBuilder {
    pub temperature: Option<f32>,
    pub humidity: Option<u8>,
    pub battery_pct: Option<u8>,
    pub battery_mv: Option<u16>,
}

impl ReadingBuilder {
    pub(crate) fn finish(self, firmware: FirmwareKind) -> Result<SensorReading, Rejection> {
        if self.temperature.is_none() && self.humidity.is_none() {
            return Err(Rejection::NoMeasurements);
        }
        Ok(SensorReading {
            temperature: self.temperature,
            humidity: self.humidity,
            battery_pct: self.battery_pct,
            battery_mv: self.battery_mv,
            firmware,
        })
    }
}

/// Why a decoder declined a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Payload shorter than the format minimum.
    #[error("payload too short: need {needed} bytes, got {actual}")]
    TooShort {
        /// Minimum length for the format.
        needed: usize,
        /// Length received.
        actual: usize,
    },

    /// Payload is encrypted; no key support.
    #[error("payload is encrypted")]
    Encrypted,

    /// MiBeacon frame without the object-present flag.
    #[error("frame carries no measurement objects")]
    NoData,

    /// MiBeacon product id other than the supported thermometer.
    #[error("unsupported device type 0x{0:04X}")]
    UnsupportedDevice(u16),

    /// BTHome version other than 2.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// Block does not start with the expected service UUID.
    #[error("service UUID mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    UuidMismatch {
        /// UUID the decoder handles.
        expected: u16,
        /// UUID found in the block.
        actual: u16,
    },

    /// Object stream contained neither temperature nor humidity.
    #[error("no temperature or humidity found")]
    NoMeasurements,

    /// No decoder registered for this service UUID.
    #[error("no decoder for service 0x{0:04X}")]
    UnknownService(u16),
}

/// Dispatches a service-data block to the decoder registered for `uuid`.
///
/// 0x181A carries two firmwares with no version field; they are told apart
/// by length alone (17+ bytes is pvvx, otherwise atc1441).
///
/// # Errors
///
/// Returns the decoder's [`Rejection`], or [`Rejection::UnknownService`] for
/// UUIDs without a decoder.
pub fn decode_service_data(uuid: u16, block: &[u8]) -> Result<SensorReading, Rejection> {
    match uuid {
        ENVIRONMENTAL_SENSING_UUID if block.len() >= pvvx::MIN_LEN => pvvx::decode(block),
        ENVIRONMENTAL_SENSING_UUID => atc1441::decode(block),
        MIBEACON_UUID => mibeacon::decode(block.get(2..).unwrap_or_default()),
        BTHOME_UUID => bthome::decode(block),
        other => Err(Rejection::UnknownService(other)),
    }
}

/// Rejects `data` when it is shorter than `needed`.
pub(crate) const fn require_len(data: &[u8], needed: usize) -> Result<(), Rejection> {
    if data.len() < needed {
        Err(Rejection::TooShort {
            needed,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Clamps a scaled integer into a whole-percent byte.
pub(crate) fn saturate_u8(value: i32) -> u8 {
    u8::try_from(value.clamp(0, i32::from(u8::MAX))).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pvvx_block() -> Vec<u8> {
        let mut block = vec![0x1A, 0x18, 0xA4, 0xC1, 0x38, 0x00, 0x00, 0x01];
        block.extend_from_slice(&2_150_i16.to_le_bytes());
        block.extend_from_slice(&4_500_u16.to_le_bytes());
        block.extend_from_slice(&2_950_u16.to_le_bytes());
        block.extend_from_slice(&[80, 7, 0]);
        block
    }

    #[test]
    fn test_dispatch_by_length_on_shared_uuid() {
        let block = pvvx_block();
        assert_eq!(block.len(), 17);
        let reading = decode_service_data(ENVIRONMENTAL_SENSING_UUID, &block).unwrap();
        assert_eq!(reading.firmware(), FirmwareKind::Pvvx);

        let atc = &block[..15];
        let reading = decode_service_data(ENVIRONMENTAL_SENSING_UUID, atc).unwrap();
        assert_eq!(reading.firmware(), FirmwareKind::Atc1441);
    }

    #[test]
    fn test_dispatch_short_shared_uuid_rejects() {
        let block = pvvx_block();
        assert_eq!(
            decode_service_data(ENVIRONMENTAL_SENSING_UUID, &block[..14]),
            Err(Rejection::TooShort {
                needed: 15,
                actual: 14
            })
        );
    }

    #[test]
    fn test_dispatch_unknown_uuid() {
        assert_eq!(
            decode_service_data(0xFEAA, &[0xAA, 0xFE, 1, 2, 3]),
            Err(Rejection::UnknownService(0xFEAA))
        );
    }

    #[test]
    fn test_dispatch_mibeacon_strips_uuid() {
        let mut block = vec![0x95, 0xFE, 0x40, 0x00, 0x5B, 0x05, 0x01];
        block.extend_from_slice(&[0xA4, 0xC1, 0x38, 0x11, 0x22, 0x33]);
        block.extend_from_slice(&[0x0A, 0x10, 0x01, 0x55, 0x04, 0x10, 0x02, 0xEB, 0x00]);
        let reading = decode_service_data(MIBEACON_UUID, &block).unwrap();
        assert_eq!(reading.firmware(), FirmwareKind::MiBeacon);
        assert_eq!(reading.temperature(), Some(23.5));
        assert_eq!(reading.battery_pct(), Some(0x55));
    }

    #[test]
    fn test_dispatch_mibeacon_empty_block() {
        assert!(matches!(
            decode_service_data(MIBEACON_UUID, &[0x95]),
            Err(Rejection::TooShort { .. })
        ));
    }

    #[test]
    fn test_builder_requires_temperature_or_humidity() {
        let builder = ReadingBuilder {
            battery_pct: Some(50),
            ..ReadingBuilder::default()
        };
        assert_eq!(
            builder.finish(FirmwareKind::BtHomeV2),
            Err(Rejection::NoMeasurements)
        );
    }

    #[test]
    fn test_saturate_u8() {
        assert_eq!(saturate_u8(-3), 0);
        assert_eq!(saturate_u8(55), 55);
        assert_eq!(saturate_u8(655), 255);
    }

    #[test]
    fn test_firmware_serializes_snake_case() {
        let json = serde_json::to_string(&FirmwareKind::BtHomeV2).unwrap();
        assert_eq!(json, "\"bt_home_v2\"");
        assert_eq!(FirmwareKind::MiBeacon.label(), "MiBeacon");
    }
}
