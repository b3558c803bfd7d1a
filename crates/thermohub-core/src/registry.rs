//! Device registry.
//!
//! The registry owns one [`DeviceRecord`] per MAC address and applies the
//! merge policy for observations:
//!
//! - Unknown addresses are only admitted while discovery mode is on (or at
//!   startup restoration), and never beyond `max_devices`.
//! - Liveness (RSSI, last seen, interval stats, source) updates on every
//!   observation of a known device.
//! - Enrichment (names, sensor data, radio metadata) only applies when the
//!   device is visible or discovery mode is on.
//!
//! The registry is plain data with no interior locking and no I/O. The
//! [`Hub`](crate::hub::Hub) wraps it in a lock and persists the settings
//! returned by mutating operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::advertisement::vendor_for_company;
use crate::config::DEFAULT_MAX_DEVICES;
use crate::decoder::{FirmwareKind, SensorReading};
use crate::error::{HubError, Result};
use crate::store::DeviceSettings;
use crate::types::{MacAddress, Timestamp};

/// Longest stored name, in characters.
pub const MAX_NAME_CHARS: usize = 31;

/// Longest retained raw advertisement, in bytes.
pub const MAX_RAW_LEN: usize = 62;

/// Field-availability bit: temperature.
pub const FIELD_TEMPERATURE: u16 = 1 << 0;
/// Field-availability bit: humidity.
pub const FIELD_HUMIDITY: u16 = 1 << 1;
/// Field-availability bit: battery percent.
pub const FIELD_BATTERY_PCT: u16 = 1 << 2;
/// Field-availability bit: battery millivolts.
pub const FIELD_BATTERY_MV: u16 = 1 << 3;

// =============================================================================
// RECORD TYPES
// =============================================================================

/// Channel that produced an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// The hub's own radio.
    #[default]
    Local,
    /// A relay node, identified by its IP.
    Satellite {
        /// Relay address as seen by the HTTP server.
        ip: String,
    },
}

/// Advertising interval statistics.
///
/// Deltas are measured on ingestion time, so a late relay delivery shows up
/// as a long interval followed by a short one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntervalStats {
    /// Most recent interval in milliseconds.
    pub last_ms: u32,
    /// Running mean interval in milliseconds.
    pub avg_ms: u32,
    /// Number of intervals in the mean (saturating).
    pub samples: u32,
}

impl IntervalStats {
    /// Folds one interval into the running mean.
    pub fn record(&mut self, delta_ms: u64) {
        let delta = u32::try_from(delta_ms).unwrap_or(u32::MAX);
        self.avg_ms = if self.samples == 0 {
            delta
        } else {
            let samples = u64::from(self.samples);
            let total = u64::from(self.avg_ms) * samples + u64::from(delta);
            u32::try_from(total / (samples + 1)).unwrap_or(u32::MAX)
        };
        self.last_ms = delta;
        self.samples = self.samples.saturating_add(1);
    }
}

/// Everything the hub knows about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub address: MacAddress,
    pub rssi: i8,
    /// `None` for a restored shell that has not been heard since startup.
    pub last_seen: Option<Timestamp>,
    pub last_sensor_seen: Option<Timestamp>,
    pub visible: bool,
    pub name: String,
    pub advertised_name: String,
    pub user_named: bool,
    pub show_mac: bool,
    pub show_ip: bool,
    pub field_mask: u16,
    pub sensor: Option<SensorReading>,
    pub source: Source,
    pub interval: IntervalStats,
    pub tx_power: Option<i8>,
    pub company_id: Option<u16>,
    pub service_uuid: Option<u16>,
    /// Last raw advertisement, at most [`MAX_RAW_LEN`] bytes.
    pub raw: Vec<u8>,
}

impl DeviceRecord {
    /// A fresh record carrying default settings.
    #[must_use]
    pub fn new(address: MacAddress) -> Self {
        let mut record = Self {
            address,
            rssi: 0,
            last_seen: None,
            last_sensor_seen: None,
            visible: false,
            name: String::new(),
            advertised_name: String::new(),
            user_named: false,
            show_mac: true,
            show_ip: true,
            field_mask: 0,
            sensor: None,
            source: Source::Local,
            interval: IntervalStats::default(),
            tx_power: None,
            company_id: None,
            service_uuid: None,
            raw: Vec::new(),
        };
        record.apply_settings(&DeviceSettings::default());
        record
    }

    /// The persisted subset of this record.
    #[must_use]
    pub fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            name: self.name.clone(),
            user_named: self.user_named,
            show_mac: self.show_mac,
            show_ip: self.show_ip,
            field_mask: self.field_mask,
            visible: self.visible,
        }
    }

    /// Overwrites the persisted subset of this record.
    pub fn apply_settings(&mut self, settings: &DeviceSettings) {
        self.name = truncate_name(&settings.name);
        self.user_named = settings.user_named;
        self.show_mac = settings.show_mac;
        self.show_ip = settings.show_ip;
        self.field_mask = settings.field_mask;
        self.visible = settings.visible;
    }

    /// Records a radio- or relay-provided name.
    ///
    /// Operator-named devices are left untouched. Otherwise the advertised
    /// name always updates, and is promoted to `name` only over an empty
    /// name, the satellite placeholder or the device's own MAC string.
    pub fn observe_name(&mut self, advertised: &str) {
        if self.user_named || advertised.is_empty() {
            return;
        }
        self.advertised_name = truncate_name(advertised);

        let mac = self.address.to_string();
        let replaceable = self.name.is_empty()
            || self.name == self.address.satellite_placeholder()
            || self.name.eq_ignore_ascii_case(&mac);
        if replaceable {
            self.name.clone_from(&self.advertised_name);
        }
    }

    /// Which sensor fields this device reports, as a bitmask.
    ///
    /// Bit 0 is set when any reading exists; bits 1 to 4 mark temperature,
    /// humidity, battery percent and battery millivolts.
    #[must_use]
    pub fn capability_signature(&self) -> u8 {
        let Some(sensor) = self.sensor else {
            return 0;
        };
        let mut signature = 1;
        if sensor.temperature().is_some_and(nonzero) {
            signature |= 1 << 1;
        }
        if sensor.humidity().is_some_and(|h| h != 0) {
            signature |= 1 << 2;
        }
        if sensor.battery_pct().is_some_and(|b| b != 0) {
            signature |= 1 << 3;
        }
        if sensor.battery_mv().is_some_and(|b| b != 0) {
            signature |= 1 << 4;
        }
        signature
    }

    /// Field-availability bitmask for display.
    ///
    /// A bit is set only for a present, nonzero value, so a genuine zero
    /// reading looks the same as a missing one. Consumers that care should
    /// read the optional fields of [`DeviceView`] instead.
    #[must_use]
    pub fn available_fields(&self) -> u16 {
        let Some(sensor) = self.sensor else {
            return 0;
        };
        let mut fields = 0;
        if sensor.temperature().is_some_and(nonzero) {
            fields |= FIELD_TEMPERATURE;
        }
        if sensor.humidity().is_some_and(|h| h != 0) {
            fields |= FIELD_HUMIDITY;
        }
        if sensor.battery_pct().is_some_and(|b| b != 0) {
            fields |= FIELD_BATTERY_PCT;
        }
        if sensor.battery_mv().is_some_and(|b| b != 0) {
            fields |= FIELD_BATTERY_MV;
        }
        fields
    }

    fn record_liveness(&mut self, at: Timestamp, rssi: i8, source: Source) {
        if let Some(previous) = self.last_seen {
            self.interval.record(at.millis_since(previous));
        }
        self.last_seen = Some(at);
        self.rssi = rssi;
        self.source = source;
    }
}

#[allow(clippy::float_cmp)]
fn nonzero(value: f32) -> bool {
    value != 0.0
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_CHARS).collect()
}

// =============================================================================
// OBSERVATIONS
// =============================================================================

/// One sighting of a device, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub address: MacAddress,
    pub rssi: i8,
    /// Ingestion time.
    pub at: Timestamp,
    pub source: Source,
    pub name: Option<String>,
    pub sensor: Option<SensorReading>,
    pub tx_power: Option<i8>,
    pub company_id: Option<u16>,
    pub service_uuid: Option<u16>,
    pub raw: Vec<u8>,
}

impl Observation {
    /// An observation carrying only liveness data.
    #[must_use]
    pub const fn new(address: MacAddress, rssi: i8, at: Timestamp, source: Source) -> Self {
        Self {
            address,
            rssi,
            at,
            source,
            name: None,
            sensor: None,
            tx_power: None,
            company_id: None,
            service_uuid: None,
            raw: Vec::new(),
        }
    }
}

/// Why an observation produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Unknown address while discovery mode is off.
    UnknownDevice,
    /// Unknown address while the registry is full.
    CapacityReached,
}

/// What [`DeviceRegistry::apply_observation`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationStatus {
    /// A new record was created and fully updated.
    Created,
    /// An existing record was fully updated.
    Updated,
    /// Hidden device outside discovery: only liveness was updated.
    LivenessOnly,
    /// No record exists and none was created.
    Dropped(DropReason),
}

/// Display preferences applied by [`DeviceRegistry::update_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    /// New name for the target device only. An empty string clears the
    /// operator name and lets the advertised name take over again.
    #[serde(default)]
    pub name: Option<String>,
    pub show_mac: bool,
    pub show_ip: bool,
    pub field_mask: u16,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Address-keyed collection of device records.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<MacAddress, DeviceRecord>,
    discovery: bool,
    max_devices: usize,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEVICES)
    }
}

impl DeviceRegistry {
    /// Creates an empty registry holding at most `max_devices` records.
    #[must_use]
    pub const fn new(max_devices: usize) -> Self {
        Self {
            devices: BTreeMap::new(),
            discovery: false,
            max_devices,
        }
    }

    /// Whether discovery mode is on.
    #[must_use]
    pub const fn is_discovering(&self) -> bool {
        self.discovery
    }

    /// Turns discovery mode on or off.
    pub fn set_discovery(&mut self, enabled: bool) {
        self.discovery = enabled;
    }

    /// Number of tracked devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of visible devices.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.devices.values().filter(|d| d.visible).count()
    }

    /// Whether `address` has a record.
    #[must_use]
    pub fn contains(&self, address: MacAddress) -> bool {
        self.devices.contains_key(&address)
    }

    /// Record for `address`, if tracked.
    #[must_use]
    pub fn get(&self, address: MacAddress) -> Option<&DeviceRecord> {
        self.devices.get(&address)
    }

    /// Returns the record for `address`, creating it when `allow_create`
    /// is set and there is room.
    pub fn find_or_create(
        &mut self,
        address: MacAddress,
        allow_create: bool,
    ) -> Option<&mut DeviceRecord> {
        self.slot(address, allow_create).ok()
    }

    fn slot(
        &mut self,
        address: MacAddress,
        allow_create: bool,
    ) -> std::result::Result<&mut DeviceRecord, DropReason> {
        let full = self.devices.len() >= self.max_devices;
        match self.devices.entry(address) {
            std::collections::btree_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::btree_map::Entry::Vacant(_) if !allow_create => {
                Err(DropReason::UnknownDevice)
            }
            std::collections::btree_map::Entry::Vacant(_) if full => {
                Err(DropReason::CapacityReached)
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                Ok(entry.insert(DeviceRecord::new(address)))
            }
        }
    }

    /// Inserts a hidden-by-default shell carrying persisted settings.
    ///
    /// Returns `false` when the registry is full. An address that is
    /// already tracked keeps its live data and takes the settings.
    pub fn restore(&mut self, address: MacAddress, settings: &DeviceSettings) -> bool {
        match self.slot(address, true) {
            Ok(record) => {
                record.apply_settings(settings);
                true
            }
            Err(_) => false,
        }
    }

    /// Merges one observation.
    ///
    /// `inherited` seeds a record created by this call; the caller loads it
    /// from the settings store beforehand.
    pub fn apply_observation(
        &mut self,
        observation: Observation,
        inherited: Option<&DeviceSettings>,
    ) -> ObservationStatus {
        let Observation {
            address,
            rssi,
            at,
            source,
            name,
            sensor,
            tx_power,
            company_id,
            service_uuid,
            raw,
        } = observation;

        let (discovery, max_devices) = (self.discovery, self.max_devices);
        let created = !self.devices.contains_key(&address);
        let record = match self.slot(address, discovery) {
            Ok(record) => record,
            Err(reason) => {
                if reason == DropReason::CapacityReached {
                    tracing::warn!(%address, max = max_devices, "Registry full, device not tracked");
                }
                return ObservationStatus::Dropped(reason);
            }
        };

        if created {
            if let Some(settings) = inherited {
                record.apply_settings(settings);
            }
            if matches!(source, Source::Satellite { .. }) && record.name.is_empty() {
                record.name = address.satellite_placeholder();
            }
            tracing::info!(%address, inherited = inherited.is_some(), "Discovered new device");
        }

        record.record_liveness(at, rssi, source);

        if !(record.visible || discovery) {
            return ObservationStatus::LivenessOnly;
        }

        if let Some(name) = name.as_deref() {
            record.observe_name(name);
        }
        if let Some(reading) = sensor {
            record.sensor = Some(reading);
            record.last_sensor_seen = Some(at);
        }
        if tx_power.is_some() {
            record.tx_power = tx_power;
        }
        if company_id.is_some() {
            record.company_id = company_id;
        }
        if service_uuid.is_some() {
            record.service_uuid = service_uuid;
        }
        if !raw.is_empty() {
            record.raw = raw;
            record.raw.truncate(MAX_RAW_LEN);
        }

        if created {
            ObservationStatus::Created
        } else {
            ObservationStatus::Updated
        }
    }

    fn tracked_mut(&mut self, address: MacAddress) -> Result<&mut DeviceRecord> {
        self.devices
            .get_mut(&address)
            .ok_or(HubError::DeviceNotFound(address))
    }

    /// Shows or hides a device. Returns the settings to persist.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`] for an untracked address.
    pub fn set_visibility(&mut self, address: MacAddress, visible: bool) -> Result<DeviceSettings> {
        let record = self.tracked_mut(address)?;
        record.visible = visible;
        Ok(record.settings())
    }

    /// Flips a device's visibility. Returns the settings to persist.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`] for an untracked address.
    pub fn toggle_visibility(&mut self, address: MacAddress) -> Result<DeviceSettings> {
        let record = self.tracked_mut(address)?;
        record.visible = !record.visible;
        Ok(record.settings())
    }

    /// Hides every visible device without removing any record.
    ///
    /// Returns the settings of each device that changed.
    pub fn clear_visibility(&mut self) -> Vec<(MacAddress, DeviceSettings)> {
        self.devices
            .values_mut()
            .filter(|record| record.visible)
            .map(|record| {
                record.visible = false;
                (record.address, record.settings())
            })
            .collect()
    }

    /// Applies display settings to `address`, and with `propagate` also to
    /// every other device sharing its capability signature.
    ///
    /// The name only ever goes to the target. Returns the settings of every
    /// updated device, target first; its length is the update count.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`] for an untracked address.
    pub fn update_settings(
        &mut self,
        address: MacAddress,
        update: &SettingsUpdate,
        propagate: bool,
    ) -> Result<Vec<(MacAddress, DeviceSettings)>> {
        let target = self.tracked_mut(address)?;
        if let Some(name) = update.name.as_deref() {
            let name = name.trim();
            target.name = truncate_name(name);
            target.user_named = !name.is_empty();
        }
        target.show_mac = update.show_mac;
        target.show_ip = update.show_ip;
        target.field_mask = update.field_mask;
        let signature = target.capability_signature();
        let mut updated = vec![(address, target.settings())];

        if propagate {
            for record in self.devices.values_mut() {
                if record.address == address || record.capability_signature() != signature {
                    continue;
                }
                record.show_mac = update.show_mac;
                record.show_ip = update.show_ip;
                record.field_mask = update.field_mask;
                updated.push((record.address, record.settings()));
            }
        }

        Ok(updated)
    }

    /// Views of tracked devices in address order.
    ///
    /// Hidden devices are included only with `include_hidden`.
    #[must_use]
    pub fn snapshot(&self, include_hidden: bool, now: Timestamp) -> Vec<DeviceView> {
        self.devices
            .values()
            .filter(|record| include_hidden || record.visible)
            .map(|record| DeviceView::from_record(record, now))
            .collect()
    }
}

// =============================================================================
// QUERY VIEW
// =============================================================================

/// Externally visible state of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "A4:C1:38:0A:1B:2C",
    "name": "Sauna",
    "advertised_name": "ATC_0A1B2C",
    "display_name": "Sauna",
    "rssi": -67,
    "visible": true,
    "user_named": true,
    "show_mac": true,
    "show_ip": false,
    "field_mask": 65535,
    "available_fields": 15,
    "source": "satellite",
    "satellite_ip": "192.168.1.40",
    "temperature": 62.5,
    "humidity": 11,
    "battery_pct": 87,
    "battery_mv": 2950,
    "firmware": "pvvx",
    "tx_power": null,
    "company_id": null,
    "vendor": null,
    "service_uuid": "0x181A",
    "raw": "12161a18...",
    "age_secs": 4,
    "interval": {"last_ms": 2510, "avg_ms": 2498, "samples": 118}
}))]
pub struct DeviceView {
    #[schema(value_type = String, example = "A4:C1:38:0A:1B:2C")]
    pub address: MacAddress,
    pub name: String,
    pub advertised_name: String,
    /// Name, else advertised name, else the MAC address.
    pub display_name: String,
    pub rssi: i8,
    pub visible: bool,
    pub user_named: bool,
    pub show_mac: bool,
    pub show_ip: bool,
    pub field_mask: u16,
    /// See [`DeviceRecord::available_fields`].
    pub available_fields: u16,
    /// `local` or `satellite`.
    pub source: String,
    pub satellite_ip: Option<String>,
    pub temperature: Option<f32>,
    pub humidity: Option<u8>,
    pub battery_pct: Option<u8>,
    pub battery_mv: Option<u16>,
    pub firmware: Option<FirmwareKind>,
    pub tx_power: Option<i8>,
    pub company_id: Option<u16>,
    pub vendor: Option<String>,
    /// Service UUID of the last decodable payload, as `0xABCD`.
    pub service_uuid: Option<String>,
    /// Last raw advertisement, lower-case hex.
    pub raw: Option<String>,
    /// Seconds since the last sensor reading, or since the last sighting
    /// for devices without readings. `None` if never heard.
    pub age_secs: Option<u64>,
    pub interval: IntervalStats,
}

impl DeviceView {
    fn from_record(record: &DeviceRecord, now: Timestamp) -> Self {
        let display_name = if !record.name.is_empty() {
            record.name.clone()
        } else if !record.advertised_name.is_empty() {
            record.advertised_name.clone()
        } else {
            record.address.to_string()
        };
        let (source, satellite_ip) = match &record.source {
            Source::Local => ("local".to_string(), None),
            Source::Satellite { ip } => ("satellite".to_string(), Some(ip.clone())),
        };
        let sensor = record.sensor;

        Self {
            address: record.address,
            name: record.name.clone(),
            advertised_name: record.advertised_name.clone(),
            display_name,
            rssi: record.rssi,
            visible: record.visible,
            user_named: record.user_named,
            show_mac: record.show_mac,
            show_ip: record.show_ip,
            field_mask: record.field_mask,
            available_fields: record.available_fields(),
            source,
            satellite_ip,
            temperature: sensor.and_then(|s| s.temperature()),
            humidity: sensor.and_then(|s| s.humidity()),
            battery_pct: sensor.and_then(|s| s.battery_pct()),
            battery_mv: sensor.and_then(|s| s.battery_mv()),
            firmware: sensor.map(|s| s.firmware()),
            tx_power: record.tx_power,
            company_id: record.company_id,
            vendor: record.company_id.map(|id| vendor_for_company(id).to_string()),
            service_uuid: record.service_uuid.map(|uuid| format!("0x{uuid:04X}")),
            raw: (!record.raw.is_empty()).then(|| hex_string(&record.raw)),
            age_secs: record
                .last_sensor_seen
                .or(record.last_seen)
                .map(|seen| now.millis_since(seen) / 1000),
            interval: record.interval,
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
