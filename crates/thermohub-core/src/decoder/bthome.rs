//! BTHome v2 service data (0xFCD2), unencrypted only.
//!
//! ```text
//! [0..2]  service UUID 0xFCD2
//! [2]     device info (bit0 encrypted, bits5-7 version)
//! [3..]   objects: [id u8][value], size fixed per id
//! ```
//!
//! Objects carry no length, so an id outside the table below ends the scan.

use super::{
    require_len, saturate_u8, FirmwareKind, ReadingBuilder, Rejection, SensorReading, BTHOME_UUID,
};

/// Minimum block length: UUID, device info and one 2-byte object.
pub const MIN_LEN: usize = 6;

const FLAG_ENCRYPTED: u8 = 0x01;
const SUPPORTED_VERSION: u8 = 2;

const ID_PACKET_ID: u8 = 0x00;
const ID_BATTERY: u8 = 0x01;
const ID_TEMPERATURE_CENTI: u8 = 0x02;
const ID_HUMIDITY_CENTI: u8 = 0x03;
const ID_HUMIDITY_BYTE: u8 = 0x2E;
const ID_TEMPERATURE_DECI: u8 = 0x45;

/// Decodes a BTHome v2 service-data block.
///
/// # Errors
///
/// Rejects short, encrypted and non-v2 blocks, and blocks with no
/// temperature or humidity before the first unknown object id.
pub fn decode(data: &[u8]) -> Result<SensorReading, Rejection> {
    require_len(data, MIN_LEN)?;

    let uuid = u16::from_le_bytes([data[0], data[1]]);
    if uuid != BTHOME_UUID {
        return Err(Rejection::UuidMismatch {
            expected: BTHOME_UUID,
            actual: uuid,
        });
    }

    let device_info = data[2];
    if device_info & FLAG_ENCRYPTED != 0 {
        return Err(Rejection::Encrypted);
    }
    let version = (device_info >> 5) & 0x07;
    if version != SUPPORTED_VERSION {
        return Err(Rejection::UnsupportedVersion(version));
    }

    let mut reading = ReadingBuilder::default();
    let mut pos = 3;
    while pos < data.len() {
        let id = data[pos];
        pos += 1;

        let Some(size) = object_size(id) else {
            tracing::trace!(object_id = id, "unknown BTHome object, ending scan");
            break;
        };
        let Some(value) = data.get(pos..pos + size) else {
            break;
        };

        match (id, value) {
            (ID_BATTERY, &[pct]) => reading.battery_pct = Some(pct),
            (ID_TEMPERATURE_CENTI, &[lo, hi]) => {
                reading.temperature = Some(f32::from(i16::from_le_bytes([lo, hi])) / 100.0);
            }
            (ID_HUMIDITY_CENTI, &[lo, hi]) => {
                reading.humidity = Some(saturate_u8(i32::from(u16::from_le_bytes([lo, hi]) / 100)));
            }
            (ID_HUMIDITY_BYTE, &[pct]) => reading.humidity = Some(pct),
            (ID_TEMPERATURE_DECI, &[lo, hi]) => {
                reading.temperature = Some(f32::from(i16::from_le_bytes([lo, hi])) / 10.0);
            }
            _ => {}
        }

        pos += size;
    }

    reading.finish(FirmwareKind::BtHomeV2)
}

const fn object_size(id: u8) -> Option<usize> {
    match id {
        ID_PACKET_ID | ID_BATTERY | ID_HUMIDITY_BYTE => Some(1),
        ID_TEMPERATURE_CENTI | ID_HUMIDITY_CENTI | ID_TEMPERATURE_DECI => Some(2),
        _ => None,
    }
}
