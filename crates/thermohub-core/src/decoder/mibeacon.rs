//! Xiaomi MiBeacon frames (service 0xFE95), unencrypted only.
//!
//! Offsets are relative to the frame that follows the service UUID:
//!
//! ```text
//! [0]      frame control, low byte (bit3 encrypted, bit5 capability, bit6 objects)
//! [1]      frame control, high byte
//! [2..4]   product id, u16 LE
//! [4]      frame counter
//! [5..11]  MAC
//! [11]     capability (only when bit5 is set)
//! [11|12.. objects: [type u16 LE][len u8][data]
//! ```

use super::{require_len, saturate_u8, FirmwareKind, ReadingBuilder, Rejection, SensorReading};

/// Minimum frame length.
pub const MIN_LEN: usize = 11;

/// LYWSD03MMC product id, the only device type decoded.
pub const LYWSD03MMC: u16 = 0x055B;

const FLAG_ENCRYPTED: u8 = 0x08;
const FLAG_CAPABILITY: u8 = 0x20;
const FLAG_OBJECTS: u8 = 0x40;

const OBJ_TEMPERATURE: u16 = 0x1004;
const OBJ_HUMIDITY: u16 = 0x1006;
const OBJ_BATTERY: u16 = 0x100A;
const OBJ_TEMP_HUMIDITY: u16 = 0x100D;

const OBJECT_HEADER_LEN: usize = 3;

/// Decodes a MiBeacon frame.
///
/// Unknown object types are skipped using their declared length. A length
/// that runs past the end of the frame ends the scan.
///
/// # Errors
///
/// Rejects short, encrypted, object-less and non-LYWSD03MMC frames, and
/// frames whose objects hold no temperature or humidity.
pub fn decode(data: &[u8]) -> Result<SensorReading, Rejection> {
    require_len(data, MIN_LEN)?;

    let flags = data[0];
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(Rejection::Encrypted);
    }
    if flags & FLAG_OBJECTS == 0 {
        return Err(Rejection::NoData);
    }

    let product_id = u16::from_le_bytes([data[2], data[3]]);
    if product_id != LYWSD03MMC {
        return Err(Rejection::UnsupportedDevice(product_id));
    }

    let mut pos = if flags & FLAG_CAPABILITY != 0 { 12 } else { 11 };
    require_len(data, pos + OBJECT_HEADER_LEN)?;

    let mut reading = ReadingBuilder::default();
    while pos + OBJECT_HEADER_LEN <= data.len() {
        let object_type = u16::from_le_bytes([data[pos], data[pos + 1]]);
        let len = usize::from(data[pos + 2]);
        let start = pos + OBJECT_HEADER_LEN;
        let Some(value) = data.get(start..start + len) else {
            break;
        };

        match (object_type, value) {
            (OBJ_TEMPERATURE, &[lo, hi]) => {
                reading.temperature = Some(deci(lo, hi));
            }
            (OBJ_HUMIDITY, &[lo, hi]) => {
                reading.humidity = Some(whole_percent(lo, hi));
            }
            (OBJ_BATTERY, &[pct]) => {
                reading.battery_pct = Some(pct);
            }
            (OBJ_TEMP_HUMIDITY, &[t_lo, t_hi, h_lo, h_hi]) => {
                reading.temperature = Some(deci(t_lo, t_hi));
                reading.humidity = Some(whole_percent(h_lo, h_hi));
            }
            _ => {}
        }

        pos = start + len;
    }

    reading.finish(FirmwareKind::MiBeacon)
}

fn deci(lo: u8, hi: u8) -> f32 {
    f32::from(i16::from_le_bytes([lo, hi])) / 10.0
}

fn whole_percent(lo: u8, hi: u8) -> u8 {
    saturate_u8(i32::from(i16::from_le_bytes([lo, hi])) / 10)
}
