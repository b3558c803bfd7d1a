//! atc1441 custom advertising format.
//!
//! ```text
//! [0..2]   service UUID 0x181A
//! [2..8]   MAC
//! [8..10]  temperature, i16 big-endian, 0.1 °C
//! [10]     humidity, %
//! [11]     battery, %
//! [12..14] battery, u16 big-endian, mV
//! [14]     frame counter
//! ```

use super::{require_len, FirmwareKind, ReadingBuilder, Rejection, SensorReading};

/// Minimum block length.
pub const MIN_LEN: usize = 15;

/// Decodes an atc1441 service-data block.
///
/// # Errors
///
/// [`Rejection::TooShort`] when the block is under [`MIN_LEN`] bytes.
pub fn decode(data: &[u8]) -> Result<SensorReading, Rejection> {
    require_len(data, MIN_LEN)?;

    let temp_raw = i16::from_be_bytes([data[8], data[9]]);

    ReadingBuilder {
        temperature: Some(f32::from(temp_raw) / 10.0),
        humidity: Some(data[10]),
        battery_pct: Some(data[11]),
        battery_mv: Some(u16::from_be_bytes([data[12], data[13]])),
    }
    .finish(FirmwareKind::Atc1441)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: [u8; 15] = [
        0x1A, 0x18, 0xA4, 0xC1, 0x38, 0x0A, 0x0B, 0x0C, 0x00, 0xD7, 0x2D, 0x5F, 0x0B, 0xB8, 0x11,
    ];

    #[test]
    fn test_decode_sample() {
        let reading = decode(&SAMPLE).unwrap();
        assert_eq!(reading.temperature(), Some(21.5));
        assert_eq!(reading.humidity(), Some(45));
        assert_eq!(reading.battery_pct(), Some(95));
        assert_eq!(reading.battery_mv(), Some(3_000));
        assert_eq!(reading.firmware(), FirmwareKind::Atc1441);
    }

    #[test]
    fn test_decode_negative_temperature() {
        let mut block = SAMPLE;
        block[8..10].copy_from_slice(&(-73_i16).to_be_bytes());
        assert_eq!(decode(&block).unwrap().temperature(), Some(-7.3));
    }

    #[test]
    fn test_short_payload_rejected() {
        for len in 0..MIN_LEN {
            assert!(matches!(
                decode(&SAMPLE[..len]),
                Err(Rejection::TooShort { needed: 15, .. })
            ));
        }
    }
}
