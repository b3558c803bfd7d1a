//! Observation ingestion.
//!
//! Both channels end in the same [`Observation`]:
//!
//! - **Local**: the radio hands over an address, RSSI and the parsed
//!   [`AdvertisementFields`] (plus the raw bytes when the stack exposes them).
//! - **Satellite**: a relay posts a [`SatelliteMessage`] whose hex payload is
//!   decoded and run through [`AdvertisementFields::parse`], the same parser
//!   the local path uses on raw bytes.
//!
//! A payload no decoder accepts still yields an observation; it just carries
//! no sensor reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::advertisement::AdvertisementFields;
use crate::decoder::{decode_service_data, SensorReading};
use crate::registry::{Observation, Source, MAX_RAW_LEN};
use crate::types::{MacAddress, Timestamp};

/// Why a satellite submission was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SatelliteError {
    /// The `mac` field is not `XX:XX:XX:XX:XX:XX`.
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),

    /// The `data` field has an odd number of hex digits.
    #[error("hex payload has odd length {0}")]
    OddHexLength(usize),

    /// The `data` field contains a non-hex character.
    #[error("invalid hex digit at position {position}")]
    InvalidHex {
        /// Character offset of the offending pair.
        position: usize,
    },
}

// =============================================================================
// SATELLITE PAYLOAD
// =============================================================================

/// JSON body posted by a satellite relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "mac": "A4:C1:38:0A:1B:2C",
    "rssi": -65,
    "data": "02010612161a182c1b0a38c1a46608a411860b510704",
    "name": "ATC_0A1B2C"
}))]
pub struct SatelliteMessage {
    /// Device address in written byte order.
    pub mac: String,
    /// Signal strength at the relay, in dBm.
    pub rssi: i32,
    /// Raw advertisement bytes as hex.
    pub data: String,
    /// Name the relay resolved for the device, if any.
    #[serde(default)]
    pub name: Option<String>,
}

/// A validated satellite submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteFrame {
    pub address: MacAddress,
    pub rssi: i8,
    pub raw: Vec<u8>,
    pub name: Option<String>,
}

impl SatelliteMessage {
    /// Validates the address and decodes the hex payload.
    ///
    /// Out-of-range RSSI values are clamped into `i8`. A blank name counts
    /// as no name.
    ///
    /// # Errors
    ///
    /// Returns a [`SatelliteError`] if the address or hex payload is
    /// malformed; the message must then be dropped whole.
    pub fn parse(&self) -> Result<SatelliteFrame, SatelliteError> {
        let address = self
            .mac
            .parse()
            .map_err(|_| SatelliteError::InvalidMac(self.mac.clone()))?;
        let raw = decode_hex(self.data.trim())?;
        let rssi = i8::try_from(self.rssi.clamp(i32::from(i8::MIN), i32::from(i8::MAX)))
            .unwrap_or(i8::MIN);
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(SatelliteFrame {
            address,
            rssi,
            raw,
            name,
        })
    }
}

/// Decodes pairs of hex digits, either case.
///
/// # Errors
///
/// Returns an error for odd-length input or non-hex characters.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, SatelliteError> {
    if hex.len() % 2 != 0 {
        return Err(SatelliteError::OddHexLength(hex.len()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(SatelliteError::InvalidHex { position: i })
        })
        .collect()
}

// =============================================================================
// LOCAL ADVERTISEMENTS
// =============================================================================

/// One advertisement heard by the local radio.
#[derive(Debug, Clone, Copy)]
pub struct LocalAdvertisement<'a> {
    pub address: MacAddress,
    pub rssi: i8,
    pub fields: AdvertisementFields<'a>,
    /// Raw advertisement bytes, when the stack provides them.
    pub raw: Option<&'a [u8]>,
}

impl<'a> LocalAdvertisement<'a> {
    /// Builds an event from raw advertisement bytes.
    #[must_use]
    pub fn from_raw(address: MacAddress, rssi: i8, raw: &'a [u8]) -> Self {
        Self {
            address,
            rssi,
            fields: AdvertisementFields::parse(raw),
            raw: Some(raw),
        }
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Runs the service data through the matching decoder.
///
/// Rejections are expected on a busy band and only logged at trace level.
#[must_use]
pub fn decode_fields(address: MacAddress, fields: &AdvertisementFields<'_>) -> Option<SensorReading> {
    let service = fields.service_data_u16?;
    match decode_service_data(service.uuid, service.block) {
        Ok(reading) => Some(reading),
        Err(rejection) => {
            tracing::trace!(%address, uuid = service.uuid, %rejection, "Service data rejected");
            None
        }
    }
}

fn normalize(
    address: MacAddress,
    rssi: i8,
    at: Timestamp,
    source: Source,
    fields: &AdvertisementFields<'_>,
    raw: &[u8],
) -> Observation {
    Observation {
        name: fields.name_str(),
        sensor: decode_fields(address, fields),
        tx_power: fields.tx_power,
        company_id: fields.manufacturer.map(|m| m.company_id),
        service_uuid: fields.service_data_u16.map(|s| s.uuid),
        raw: raw[..raw.len().min(MAX_RAW_LEN)].to_vec(),
        ..Observation::new(address, rssi, at, source)
    }
}

/// Normalizes a local radio event.
#[must_use]
pub fn local_observation(advertisement: &LocalAdvertisement<'_>, at: Timestamp) -> Observation {
    normalize(
        advertisement.address,
        advertisement.rssi,
        at,
        Source::Local,
        &advertisement.fields,
        advertisement.raw.unwrap_or_default(),
    )
}

/// Normalizes a satellite frame received from `ip`.
///
/// A relay-resolved name takes precedence over the advertised one.
#[must_use]
pub fn satellite_observation(frame: &SatelliteFrame, ip: &str, at: Timestamp) -> Observation {
    let fields = AdvertisementFields::parse(&frame.raw);
    let mut observation = normalize(
        frame.address,
        frame.rssi,
        at,
        Source::Satellite { ip: ip.to_string() },
        &fields,
        &frame.raw,
    );
    if frame.name.is_some() {
        observation.name.clone_from(&frame.name);
    }
    observation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FirmwareKind;

    /// Flags, complete name "ATC_TEST" and a 17-byte pvvx service-data block.
    const PVVX_ADV: &str = "020106\
        0909415443 5f54455354\
        1216 1a18 2c1b0a38c1a4 6608 a411 860b 51 07 04";

    fn pvvx_hex() -> String {
        PVVX_ADV.split_whitespace().collect()
    }

    fn message(data: &str) -> SatelliteMessage {
        SatelliteMessage {
            mac: "A4:C1:38:0A:1B:2C".into(),
            rssi: -65,
            data: data.into(),
            name: None,
        }
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("00ffA0").unwrap(), vec![0x00, 0xFF, 0xA0]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("abc"), Err(SatelliteError::OddHexLength(3)));
        assert_eq!(
            decode_hex("00zz"),
            Err(SatelliteError::InvalidHex { position: 2 })
        );
    }

    #[test]
    fn test_decode_hex_rejects_signs() {
        assert_eq!(
            decode_hex("+a+b"),
            Err(SatelliteError::InvalidHex { position: 0 })
        );
        assert_eq!(
            decode_hex("02-1"),
            Err(SatelliteError::InvalidHex { position: 2 })
        );
        assert_eq!(
            message("+2+1+6").parse(),
            Err(SatelliteError::InvalidHex { position: 0 })
        );
    }

    #[test]
    fn test_satellite_parse() {
        let frame = message(&pvvx_hex()).parse().unwrap();
        assert_eq!(frame.address.to_string(), "A4:C1:38:0A:1B:2C");
        assert_eq!(frame.rssi, -65);
        assert_eq!(frame.raw.len(), 32);
        assert_eq!(frame.name, None);
    }

    #[test]
    fn test_satellite_rejects_bad_mac() {
        let mut msg = message("020106");
        msg.mac = "A4C1380A1B2C".into();
        assert!(matches!(msg.parse(), Err(SatelliteError::InvalidMac(_))));
    }

    #[test]
    fn test_satellite_rejects_truncated_hex() {
        assert_eq!(
            message("02010").parse(),
            Err(SatelliteError::OddHexLength(5))
        );
    }

    #[test]
    fn test_satellite_rssi_clamped() {
        let mut msg = message("");
        msg.rssi = -300;
        assert_eq!(msg.parse().unwrap().rssi, i8::MIN);
    }

    #[test]
    fn test_satellite_observation_decodes_like_local() {
        let frame = message(&pvvx_hex()).parse().unwrap();
        let remote = satellite_observation(&frame, "192.168.1.40", Timestamp::from_millis(5));

        let local_adv = LocalAdvertisement::from_raw(frame.address, frame.rssi, &frame.raw);
        let local = local_observation(&local_adv, Timestamp::from_millis(5));

        let reading = remote.sensor.unwrap();
        assert_eq!(reading.firmware(), FirmwareKind::Pvvx);
        assert_eq!(reading.temperature(), Some(21.5));
        assert_eq!(reading.humidity(), Some(45));
        assert_eq!(reading.battery_mv(), Some(2950));
        assert_eq!(reading.battery_pct(), Some(81));
        assert_eq!(remote.sensor, local.sensor);
        assert_eq!(remote.name.as_deref(), Some("ATC_TEST"));
        assert_eq!(remote.service_uuid, Some(0x181A));
        assert_eq!(
            remote.source,
            Source::Satellite {
                ip: "192.168.1.40".into()
            }
        );
        assert_eq!(local.source, Source::Local);
    }

    #[test]
    fn test_relay_name_takes_precedence() {
        let mut msg = message(&pvvx_hex());
        msg.name = Some("  Greenhouse ".into());
        let frame = msg.parse().unwrap();
        let observation = satellite_observation(&frame, "10.0.0.2", Timestamp::default());
        assert_eq!(observation.name.as_deref(), Some("Greenhouse"));
    }

    #[test]
    fn test_rejected_payload_still_observed() {
        // MiBeacon frame with the encryption flag set.
        let frame = message("0e 16 95fe 4850 5b05 01 2c1b0a38c1a4".replace(' ', "").as_str())
            .parse()
            .unwrap();
        let observation = satellite_observation(&frame, "10.0.0.2", Timestamp::default());
        assert_eq!(observation.sensor, None);
        assert_eq!(observation.service_uuid, Some(0xFE95));
        assert_eq!(observation.rssi, -65);
    }

    #[test]
    fn test_raw_is_capped() {
        let raw = [0u8; 100];
        let adv = LocalAdvertisement::from_raw(MacAddress::new([1; 6]), -50, &raw);
        assert_eq!(local_observation(&adv, Timestamp::default()).raw.len(), MAX_RAW_LEN);
    }
}
