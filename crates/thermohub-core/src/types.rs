//! Shared value types: device addresses and ingestion timestamps.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Matches `AA:BB:CC:DD:EE:FF`, either case.
static MAC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("MAC pattern is a valid regex")
});

/// Returns `true` if `s` is a colon-separated six-octet MAC address.
#[must_use]
pub fn is_valid_mac_address(s: &str) -> bool {
    MAC_PATTERN.is_match(s)
}

/// A 6-byte Bluetooth device address in written order.
///
/// `AA:BB:CC:DD:EE:FF` is stored as `[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

/// Error returned when a MAC string is not `XX:XX:XX:XX:XX:XX`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address '{0}', expected XX:XX:XX:XX:XX:XX")]
pub struct InvalidMacAddress(pub String);

impl MacAddress {
    /// Builds an address from bytes in written order.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw bytes in written order.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// The 12-hex-character store key: bytes reversed, lower case.
    ///
    /// `AA:BB:CC:DD:EE:FF` becomes `ffeeddccbbaa`.
    #[must_use]
    pub fn store_key(&self) -> String {
        self.0.iter().rev().map(|b| format!("{b:02x}")).collect()
    }

    /// Inverse of [`MacAddress::store_key`].
    #[must_use]
    pub fn from_store_key(key: &str) -> Option<Self> {
        if key.len() != 12 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut bytes = [0u8; 6];
        for (i, slot) in bytes.iter_mut().rev().enumerate() {
            *slot = u8::from_str_radix(&key[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Placeholder name given to relay-discovered devices with no name yet.
    #[must_use]
    pub fn satellite_placeholder(&self) -> String {
        format!("Sat-{:02X}{:02X}", self.0[4], self.0[5])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = InvalidMacAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !is_valid_mac_address(s) {
            return Err(InvalidMacAddress(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(s.split(':')) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| InvalidMacAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ingestion time in milliseconds on the hub's monotonic clock.
///
/// Satellite observations are stamped when they arrive, not when they were
/// captured, so deltas between two timestamps are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Builds a timestamp from milliseconds.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Milliseconds since the clock origin.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}
