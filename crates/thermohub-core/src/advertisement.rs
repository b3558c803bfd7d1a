//! Structured view of a raw BLE advertisement.
//!
//! Both ingestion paths reduce their input to [`AdvertisementFields`] before
//! decoding, so a relayed advertisement decodes exactly like one heard by
//! the local radio.

use uuid::Uuid;

const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_TX_POWER: u8 = 0x0A;
const AD_SERVICE_DATA_UUID16: u8 = 0x16;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Recovers the 16-bit short form of a SIG base UUID.
#[must_use]
pub fn uuid_to_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let short = u16::try_from((value >> 96) & 0xFFFF).ok()?;
    (value & !(0xFFFF_u128 << 96) == BLUETOOTH_BASE_UUID).then_some(short)
}

/// Manufacturer-specific data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerData<'a> {
    /// SIG company identifier.
    pub company_id: u16,
    /// Bytes following the company identifier.
    pub payload: &'a [u8],
}

/// 16-bit service-data element.
///
/// `block` is the whole element body, so its first two bytes are the UUID
/// in little-endian order. Decoder offsets are defined against this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceData<'a> {
    /// 16-bit service UUID.
    pub uuid: u16,
    /// Element body, UUID included.
    pub block: &'a [u8],
}

/// The fields of one advertisement that the hub cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvertisementFields<'a> {
    /// Local name (complete or shortened).
    pub name: Option<&'a [u8]>,
    /// Manufacturer-specific data.
    pub manufacturer: Option<ManufacturerData<'a>>,
    /// 16-bit service data.
    pub service_data_u16: Option<ServiceData<'a>>,
    /// Advertised transmit power in dBm.
    pub tx_power: Option<i8>,
}

impl<'a> AdvertisementFields<'a> {
    /// Parses raw advertisement bytes as a sequence of
    /// `[len][type][data; len - 1]` structures.
    ///
    /// A zero length ends the payload. A structure that claims more bytes
    /// than remain ends parsing, keeping whatever was found before it. When
    /// an element type repeats, the first occurrence wins, except that a
    /// complete name replaces a shortened one.
    #[must_use]
    pub fn parse(raw: &'a [u8]) -> Self {
        let mut fields = Self::default();
        let mut complete_name = false;
        let mut i = 0;

        while i < raw.len() {
            let len = usize::from(raw[i]);
            if len == 0 {
                break;
            }
            let Some(element) = raw.get(i + 1..i + 1 + len) else {
                break;
            };
            let (ad_type, body) = (element[0], &element[1..]);

            match ad_type {
                AD_COMPLETE_NAME if !body.is_empty() && !complete_name => {
                    fields.name = Some(body);
                    complete_name = true;
                }
                AD_SHORT_NAME if !body.is_empty() && fields.name.is_none() => {
                    fields.name = Some(body);
                }
                AD_TX_POWER if fields.tx_power.is_none() => {
                    if let [level] = body {
                        fields.tx_power = Some(i8::from_le_bytes([*level]));
                    }
                }
                AD_SERVICE_DATA_UUID16 if fields.service_data_u16.is_none() => {
                    if let [lo, hi, ..] = body {
                        fields.service_data_u16 = Some(ServiceData {
                            uuid: u16::from_le_bytes([*lo, *hi]),
                            block: body,
                        });
                    }
                }
                AD_MANUFACTURER_DATA if fields.manufacturer.is_none() => {
                    if let [lo, hi, payload @ ..] = body {
                        fields.manufacturer = Some(ManufacturerData {
                            company_id: u16::from_le_bytes([*lo, *hi]),
                            payload,
                        });
                    }
                }
                _ => {}
            }

            i += 1 + len;
        }

        fields
    }

    /// Local name decoded lossily as UTF-8, trimmed of trailing NULs.
    #[must_use]
    pub fn name_str(&self) -> Option<String> {
        let name = String::from_utf8_lossy(self.name?)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        (!name.is_empty()).then_some(name)
    }
}

/// Re-encodes advertisement fields as `[len][type][data]` structures.
///
/// BlueZ exposes advertisements as parsed device properties only. The local
/// scanner rebuilds raw bytes with this so both channels share
/// [`AdvertisementFields::parse`]. Elements too long for one structure are
/// left out.
#[derive(Debug, Clone, Default)]
pub struct AdvertisementBuilder {
    raw: Vec<u8>,
}

impl AdvertisementBuilder {
    /// Starts an empty advertisement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, ad_type: u8, parts: &[&[u8]]) -> Self {
        let body_len: usize = parts.iter().map(|p| p.len()).sum();
        if let Ok(len) = u8::try_from(body_len + 1) {
            self.raw.push(len);
            self.raw.push(ad_type);
            for part in parts {
                self.raw.extend_from_slice(part);
            }
        }
        self
    }

    /// Adds a complete local name.
    #[must_use]
    pub fn name(self, name: &str) -> Self {
        self.push(AD_COMPLETE_NAME, &[name.as_bytes()])
    }

    /// Adds a transmit power level.
    #[must_use]
    pub fn tx_power(self, dbm: i8) -> Self {
        self.push(AD_TX_POWER, &[&dbm.to_le_bytes()])
    }

    /// Adds manufacturer data for `company_id`.
    #[must_use]
    pub fn manufacturer(self, company_id: u16, payload: &[u8]) -> Self {
        self.push(AD_MANUFACTURER_DATA, &[&company_id.to_le_bytes(), payload])
    }

    /// Adds 16-bit service data; `payload` excludes the UUID.
    #[must_use]
    pub fn service_data(self, uuid: u16, payload: &[u8]) -> Self {
        self.push(AD_SERVICE_DATA_UUID16, &[&uuid.to_le_bytes(), payload])
    }

    /// The encoded bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.raw
    }
}

/// Vendor label for a SIG company identifier.
#[must_use]
pub const fn vendor_for_company(company_id: u16) -> &'static str {
    match company_id {
        0x038F => "Xiaomi",
        0x004C => "Apple",
        0x0006 => "Microsoft",
        0x0075 => "Samsung",
        0x00E0 => "Google",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_fields() {
        let raw = [
            0x02, 0x01, 0x06, // flags
            0x05, 0x09, b'A', b'T', b'C', b'1', // complete name
            0x02, 0x0A, 0xF8, // tx power -8
            0x05, 0xFF, 0x8F, 0x03, 0x01, 0x02, // manufacturer
            0x05, 0x16, 0xD2, 0xFC, 0x40, 0x01, // service data
        ];
        let fields = AdvertisementFields::parse(&raw);
        assert_eq!(fields.name, Some(&b"ATC1"[..]));
        assert_eq!(fields.tx_power, Some(-8));
        assert_eq!(
            fields.manufacturer,
            Some(ManufacturerData {
                company_id: 0x038F,
                payload: &[0x01, 0x02],
            })
        );
        let service = fields.service_data_u16.unwrap();
        assert_eq!(service.uuid, 0xFCD2);
        assert_eq!(service.block, &[0xD2, 0xFC, 0x40, 0x01]);
    }

    #[test]
    fn test_overrunning_structure_keeps_earlier_fields() {
        let raw = [0x03, 0x09, b'H', b'i', 0x09, 0x16, 0x1A, 0x18];
        let fields = AdvertisementFields::parse(&raw);
        assert_eq!(fields.name_str().as_deref(), Some("Hi"));
        assert!(fields.service_data_u16.is_none());
    }

    #[test]
    fn test_zero_length_terminates() {
        let raw = [0x00, 0x03, 0x09, b'H', b'i'];
        assert_eq!(AdvertisementFields::parse(&raw), AdvertisementFields::default());
    }

    #[test]
    fn test_complete_name_beats_short_name() {
        let raw = [0x03, 0x08, b'A', b'B', 0x05, 0x09, b'A', b'B', b'C', b'D'];
        let fields = AdvertisementFields::parse(&raw);
        assert_eq!(fields.name_str().as_deref(), Some("ABCD"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(AdvertisementFields::parse(&[]), AdvertisementFields::default());
    }

    #[test]
    fn test_name_str_trims_nul_padding() {
        let raw = [0x05, 0x09, b'L', b'Y', 0x00, 0x00];
        let fields = AdvertisementFields::parse(&raw);
        assert_eq!(fields.name_str().as_deref(), Some("LY"));
    }

    #[test]
    fn test_uuid_short_form() {
        let uuid = Uuid::parse_str("0000181a-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(uuid_to_u16(&uuid), Some(0x181A));
        let vendor = Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
        assert_eq!(uuid_to_u16(&vendor), None);
        assert_eq!(uuid_to_u16(&Uuid::nil()), None);
    }

    #[test]
    fn test_builder_output_parses_back() {
        let raw = AdvertisementBuilder::new()
            .name("LYWSD03MMC")
            .tx_power(-4)
            .manufacturer(0x038F, &[0xAA])
            .service_data(0x181A, &[0x01, 0x02, 0x03])
            .build();
        let fields = AdvertisementFields::parse(&raw);
        assert_eq!(fields.name_str().as_deref(), Some("LYWSD03MMC"));
        assert_eq!(fields.tx_power, Some(-4));
        assert_eq!(fields.manufacturer.unwrap().company_id, 0x038F);
        assert_eq!(
            fields.service_data_u16.unwrap().block,
            &[0x1A, 0x18, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn test_builder_skips_oversized_element() {
        let raw = AdvertisementBuilder::new()
            .manufacturer(0x004C, &[0u8; 300])
            .tx_power(0)
            .build();
        assert_eq!(raw, vec![0x02, AD_TX_POWER, 0x00]);
    }

    #[test]
    fn test_vendor_for_company() {
        assert_eq!(vendor_for_company(0x038F), "Xiaomi");
        assert_eq!(vendor_for_company(0x1234), "Unknown");
    }
}
