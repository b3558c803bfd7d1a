//! Persistent per-device settings.
//!
//! Settings live in a flat key-value store. Each device owns a handful of
//! keys built from its byte-reversed 12-hex address:
//!
//! | key            | value                         |
//! |----------------|-------------------------------|
//! | `<hex>`        | visibility, u8 (0 hidden)     |
//! | `<hex>_n`      | name, string                  |
//! | `<hex>_u`      | user named, u8                |
//! | `<hex>_m`      | show MAC, u8                  |
//! | `<hex>_i`      | show IP, u8                   |
//! | `<hex>_f`      | field mask, u16               |
//!
//! The bare visibility key doubles as the device's presence marker: startup
//! restoration enumerates those keys to rebuild the device list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::MacAddress;

/// Field mask value meaning "show every field".
pub const FIELD_MASK_ALL: u16 = u16::MAX;

/// Errors raised by a settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// Backing file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The backing file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// Backing file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The backing file is not a valid settings document.
    #[error("failed to parse {}: {source}", path.display())]
    ParseError {
        /// Backing file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The settings could not be serialized.
    #[error("failed to serialize settings: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The store is unusable (e.g. a poisoned lock).
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which persisted setting a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingField {
    /// Bare key: visibility byte.
    Visibility,
    /// `_n`: display name.
    Name,
    /// `_u`: name was typed by the operator.
    UserNamed,
    /// `_m`: show the MAC address.
    ShowMac,
    /// `_i`: show the relay IP.
    ShowIp,
    /// `_f`: displayed-field mask.
    FieldMask,
}

impl SettingField {
    const ALL: [Self; 6] = [
        Self::Visibility,
        Self::Name,
        Self::UserNamed,
        Self::ShowMac,
        Self::ShowIp,
        Self::FieldMask,
    ];

    /// Key suffix for this field.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Visibility => "",
            Self::Name => "_n",
            Self::UserNamed => "_u",
            Self::ShowMac => "_m",
            Self::ShowIp => "_i",
            Self::FieldMask => "_f",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.suffix() == suffix)
    }
}

/// A typed store key: device address plus field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingKey {
    /// Device the setting belongs to.
    pub address: MacAddress,
    /// Which setting.
    pub field: SettingField,
}

impl SettingKey {
    /// Builds a key.
    #[must_use]
    pub const fn new(address: MacAddress, field: SettingField) -> Self {
        Self { address, field }
    }

    /// Renders the key string, e.g. `ffeeddccbbaa_n`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}{}", self.address.store_key(), self.field.suffix())
    }

    /// Parses a rendered key. Returns `None` for foreign keys.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let hex = key.get(..12)?;
        let address = MacAddress::from_store_key(hex)?;
        let field = SettingField::from_suffix(&key[12..])?;
        Some(Self { address, field })
    }
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    /// UTF-8 string.
    Str(String),
    /// Unsigned byte.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
}

impl StoredValue {
    const fn as_u8(&self) -> Option<u8> {
        match self {
            Self::U8(v) => Some(*v),
            _ => None,
        }
    }

    const fn as_u16(&self) -> Option<u16> {
        match self {
            Self::U16(v) => Some(*v),
            _ => None,
        }
    }

    fn into_string(self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Key-value backend for device settings.
///
/// Implementations do their own locking; the registry never calls a store
/// while holding its own lock.
pub trait SettingsStore: Send + Sync {
    /// Reads one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &SettingKey) -> StoreResult<Option<StoredValue>>;

    /// Writes several values as one update.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_many(&self, entries: Vec<(SettingKey, StoredValue)>) -> StoreResult<()>;

    /// Lists every key in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn keys(&self) -> StoreResult<Vec<SettingKey>>;

    /// Writes one value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &SettingKey, value: StoredValue) -> StoreResult<()> {
        self.set_many(vec![(*key, value)])
    }
}

/// The persisted subset of a device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceSettings {
    /// Display name.
    pub name: String,
    /// `name` was typed by the operator and is never overwritten by radio data.
    pub user_named: bool,
    /// Show the MAC address in the UI.
    pub show_mac: bool,
    /// Show the relay IP in the UI.
    pub show_ip: bool,
    /// Which fields the UI displays.
    pub field_mask: u16,
    /// Exposed on the default device listing.
    pub visible: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            user_named: false,
            show_mac: true,
            show_ip: true,
            field_mask: FIELD_MASK_ALL,
            visible: false,
        }
    }
}

/// Loads the persisted settings for `address`.
///
/// Returns `Ok(None)` when no key for the device exists. Individual keys
/// that are missing or hold the wrong type fall back to their defaults.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn load_settings(
    store: &dyn SettingsStore,
    address: MacAddress,
) -> StoreResult<Option<DeviceSettings>> {
    let mut values = BTreeMap::new();
    for field in SettingField::ALL {
        if let Some(value) = store.get(&SettingKey::new(address, field))? {
            values.insert(field, value);
        }
    }
    if values.is_empty() {
        return Ok(None);
    }

    let defaults = DeviceSettings::default();
    let flag = |field, default: bool| {
        values
            .get(&field)
            .and_then(StoredValue::as_u8)
            .map_or(default, |v| v != 0)
    };

    Ok(Some(DeviceSettings {
        visible: flag(SettingField::Visibility, defaults.visible),
        user_named: flag(SettingField::UserNamed, defaults.user_named),
        show_mac: flag(SettingField::ShowMac, defaults.show_mac),
        show_ip: flag(SettingField::ShowIp, defaults.show_ip),
        field_mask: values
            .get(&SettingField::FieldMask)
            .and_then(StoredValue::as_u16)
            .unwrap_or(defaults.field_mask),
        name: values
            .remove(&SettingField::Name)
            .and_then(StoredValue::into_string)
            .unwrap_or_default(),
    }))
}

/// Writes every setting for `address`.
///
/// # Errors
///
/// Returns an error if the store cannot be written.
pub fn save_settings(
    store: &dyn SettingsStore,
    address: MacAddress,
    settings: &DeviceSettings,
) -> StoreResult<()> {
    let key = |field| SettingKey::new(address, field);
    store.set_many(vec![
        (key(SettingField::Visibility), StoredValue::U8(settings.visible.into())),
        (key(SettingField::Name), StoredValue::Str(settings.name.clone())),
        (key(SettingField::UserNamed), StoredValue::U8(settings.user_named.into())),
        (key(SettingField::ShowMac), StoredValue::U8(settings.show_mac.into())),
        (key(SettingField::ShowIp), StoredValue::U8(settings.show_ip.into())),
        (key(SettingField::FieldMask), StoredValue::U16(settings.field_mask)),
    ])
}

/// Addresses with a bare visibility key, in address order.
///
/// # Errors
///
/// Returns an error if the store cannot be enumerated.
pub fn persisted_addresses(store: &dyn SettingsStore) -> StoreResult<Vec<MacAddress>> {
    let mut addresses: Vec<MacAddress> = store
        .keys()?
        .into_iter()
        .filter(|key| key.field == SettingField::Visibility)
        .map(|key| key.address)
        .collect();
    addresses.sort_unstable();
    addresses.dedup();
    Ok(addresses)
}

// =============================================================================
// BACKENDS
// =============================================================================

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

/// Volatile store, for tests and diskless deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<SettingKey, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &SettingKey) -> StoreResult<Option<StoredValue>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set_many(&self, batch: Vec<(SettingKey, StoredValue)>) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.extend(batch);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<SettingKey>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.keys().copied().collect())
    }
}

/// Store backed by a single JSON document of rendered key to value.
///
/// The document is read once at open and rewritten on every update through
/// a temporary file and rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::ReadError {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| StoreError::ParseError {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Opens the store at `path`, falling back to an empty store when the
    /// file cannot be read or parsed.
    ///
    /// The bad file is renamed to `*.json.corrupt` so the next write does
    /// not destroy it. If the rename fails too, the next write replaces it.
    pub fn open_or_recover(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Settings store unreadable, using defaults");
                let aside = path.with_extension("json.corrupt");
                match std::fs::rename(&path, &aside) {
                    Ok(()) => tracing::warn!(to = %aside.display(), "Moved unreadable settings file aside"),
                    Err(e) => tracing::warn!(error = %e, "Failed to move unreadable settings file aside"),
                }
                Self {
                    path,
                    entries: RwLock::new(BTreeMap::new()),
                }
            }
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, StoredValue>) -> StoreResult<()> {
        let write_err = |source| StoreError::WriteError {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &SettingKey) -> StoreResult<Option<StoredValue>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(&key.render()).cloned())
    }

    fn set_many(&self, batch: Vec<(SettingKey, StoredValue)>) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (key, value) in batch {
            entries.insert(key.render(), value);
        }
        self.persist(&entries)
    }

    fn keys(&self) -> StoreResult<Vec<SettingKey>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.keys().filter_map(|k| SettingKey::parse(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mac() -> MacAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    fn custom() -> DeviceSettings {
        DeviceSettings {
            name: "Olohuone".into(),
            user_named: true,
            show_mac: false,
            show_ip: true,
            field_mask: 0x0005,
            visible: true,
        }
    }

    #[test]
    fn test_key_rendering() {
        let key = SettingKey::new(mac(), SettingField::Name);
        assert_eq!(key.render(), "ffeeddccbbaa_n");
        assert_eq!(SettingKey::new(mac(), SettingField::Visibility).render(), "ffeeddccbbaa");
        assert_eq!(SettingKey::parse("ffeeddccbbaa_n"), Some(key));
        assert_eq!(SettingKey::parse("ffeeddccbbaa_x"), None);
        assert_eq!(SettingKey::parse("wifi_ssid"), None);
    }

    #[test]
    fn test_load_absent_device() {
        let store = MemoryStore::new();
        assert_eq!(load_settings(&store, mac()).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        save_settings(&store, mac(), &custom()).unwrap();
        assert_eq!(load_settings(&store, mac()).unwrap(), Some(custom()));
    }

    #[test]
    fn test_partial_and_mistyped_keys_use_defaults() {
        let store = MemoryStore::new();
        store
            .set(&SettingKey::new(mac(), SettingField::Visibility), StoredValue::U8(1))
            .unwrap();
        store
            .set(
                &SettingKey::new(mac(), SettingField::FieldMask),
                StoredValue::Str("garbage".into()),
            )
            .unwrap();
        let settings = load_settings(&store, mac()).unwrap().unwrap();
        assert!(settings.visible);
        assert_eq!(settings.field_mask, FIELD_MASK_ALL);
        assert!(settings.name.is_empty());
        assert!(!settings.user_named);
    }

    #[test]
    fn test_persisted_addresses_from_visibility_keys() {
        let store = MemoryStore::new();
        let other: MacAddress = "11:22:33:44:55:66".parse().unwrap();
        save_settings(&store, mac(), &custom()).unwrap();
        store
            .set(
                &SettingKey::new(other, SettingField::Name),
                StoredValue::Str("orphan".into()),
            )
            .unwrap();
        assert_eq!(persisted_addresses(&store).unwrap(), vec![mac()]);
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("settings.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            save_settings(&store, mac(), &custom()).unwrap();
        }
        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(load_settings(&store, mac()).unwrap(), Some(custom()));
        assert_eq!(persisted_addresses(&store).unwrap(), vec![mac()]);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ffeeddccbbaa_n\""));
    }

    #[test]
    fn test_json_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::ParseError { .. })
        ));
    }

    #[test]
    fn test_json_file_store_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open_or_recover(&path);
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("settings.json.corrupt")).unwrap(),
            "{not json"
        );

        let mac: MacAddress = "A4:C1:38:0A:1B:2C".parse().unwrap();
        save_settings(&store, mac, &DeviceSettings::default()).unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(load_settings(&reopened, mac).unwrap().is_some());
    }
}
