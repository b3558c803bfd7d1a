//! pvvx custom advertising format.
//!
//! All fields little-endian:
//!
//! ```text
//! [0..2]   service UUID 0x181A
//! [2..8]   MAC
//! [8..10]  temperature, i16, 0.01 °C
//! [10..12] humidity, u16, 0.01 %
//! [12..14] battery, u16, mV
//! [14]     battery, %
//! [15]     measurement counter
//! [16]     flags
//! ```

use super::{require_len, saturate_u8, FirmwareKind, ReadingBuilder, Rejection, SensorReading};

/// Minimum block length, and the threshold that separates pvvx from atc1441.
pub const MIN_LEN: usize = 17;

/// Decodes a pvvx service-data block.
///
/// # Errors
///
/// [`Rejection::TooShort`] when the block is under [`MIN_LEN`] bytes.
pub fn decode(data: &[u8]) -> Result<SensorReading, Rejection> {
    require_len(data, MIN_LEN)?;

    let temp_raw = i16::from_le_bytes([data[8], data[9]]);
    let humi_raw = u16::from_le_bytes([data[10], data[11]]);

    ReadingBuilder {
        temperature: Some(f32::from(temp_raw) / 100.0),
        humidity: Some(saturate_u8(i32::from(humi_raw / 100))),
        battery_mv: Some(u16::from_le_bytes([data[12], data[13]])),
        battery_pct: Some(data[14]),
    }
    .finish(FirmwareKind::Pvvx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(temp_c: f32, humidity: u8, battery_mv: u16, battery_pct: u8) -> Vec<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let temp_raw = (temp_c * 100.0).round() as i16;
        let humi_raw = u16::from(humidity) * 100 + 37;

        let mut block = vec![0x1A, 0x18, 0x38, 0xC1, 0xA4, 0x12, 0x34, 0x56];
        block.extend_from_slice(&temp_raw.to_le_bytes());
        block.extend_from_slice(&humi_raw.to_le_bytes());
        block.extend_from_slice(&battery_mv.to_le_bytes());
        block.push(battery_pct);
        block.push(0x2A);
        block.push(0x04);
        block
    }

    #[test]
    fn test_decode_recovers_encoded_values() {
        let reading = decode(&encode(21.37, 48, 3_012, 91)).unwrap();
        let temp = reading.temperature().unwrap();
        assert!((temp - 21.37).abs() < 0.005, "got {temp}");
        assert_eq!(reading.humidity(), Some(48));
        assert_eq!(reading.battery_mv(), Some(3_012));
        assert_eq!(reading.battery_pct(), Some(91));
        assert_eq!(reading.firmware(), FirmwareKind::Pvvx);
    }

    #[test]
    fn test_decode_negative_temperature() {
        let reading = decode(&encode(-12.5, 70, 2_800, 40)).unwrap();
        assert_eq!(reading.temperature(), Some(-12.5));
    }

    #[test]
    fn test_humidity_truncates_to_whole_percent() {
        let mut block = encode(20.0, 0, 3_000, 100);
        block[10..12].copy_from_slice(&5_599_u16.to_le_bytes());
        assert_eq!(decode(&block).unwrap().humidity(), Some(55));
    }

    #[test]
    fn test_short_payload_rejected() {
        let block = encode(20.0, 50, 3_000, 100);
        for len in 0..MIN_LEN {
            assert_eq!(
                decode(&block[..len]),
                Err(Rejection::TooShort {
                    needed: MIN_LEN,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_longer_payload_accepted() {
        let mut block = encode(19.0, 40, 2_900, 77);
        block.extend_from_slice(&[0, 0]);
        assert!(decode(&block).is_ok());
    }
}
