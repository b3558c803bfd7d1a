//! The hub service: a shared registry plus its settings store.
//!
//! [`Hub`] is the single entry point for both ingestion channels and for
//! operator actions. The registry sits behind one `RwLock`; every
//! observation is a single short write-lock critical section. Store reads
//! and writes always happen outside the lock.
//!
//! Settings writes go through a second lock that is taken before the
//! registry guard is released, so the store sees changes in registry order.
//! The write itself runs on the blocking pool.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use utoipa::ToSchema;

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::ingest::{local_observation, satellite_observation, LocalAdvertisement, SatelliteMessage};
use crate::registry::{DeviceRegistry, DeviceView, Observation, ObservationStatus, SettingsUpdate};
use crate::store::{
    load_settings, persisted_addresses, save_settings, DeviceSettings, SettingsStore,
};
use crate::types::{MacAddress, Timestamp};

/// Registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct HubStats {
    /// Tracked devices.
    pub devices: usize,
    /// Visible devices.
    pub visible: usize,
    /// Whether discovery mode is on.
    pub discovering: bool,
}

/// Shared registry, settings store and ingestion clock.
pub struct Hub {
    registry: RwLock<DeviceRegistry>,
    store: Arc<dyn SettingsStore>,
    write_order: Arc<Mutex<()>>,
    started: Instant,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("started", &self.started).finish_non_exhaustive()
    }
}

impl Hub {
    /// Creates a hub with an empty registry.
    #[must_use]
    pub fn new(config: &RegistryConfig, store: Arc<dyn SettingsStore>) -> Self {
        let mut registry = DeviceRegistry::new(config.max_devices);
        registry.set_discovery(config.discovery_on_start);
        Self {
            registry: RwLock::new(registry),
            store,
            write_order: Arc::new(Mutex::new(())),
            started: Instant::now(),
        }
    }

    /// Milliseconds since the hub started.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    /// Rebuilds device shells from every persisted visibility key.
    ///
    /// Returns the number of devices restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated. Unreadable
    /// settings for a single device fall back to defaults.
    pub async fn restore(&self) -> Result<usize> {
        let addresses = persisted_addresses(self.store.as_ref())?;
        let mut loaded = Vec::with_capacity(addresses.len());
        for address in addresses {
            let settings = self.load_or_default(address).unwrap_or_default();
            loaded.push((address, settings));
        }

        let mut registry = self.registry.write().await;
        let mut restored = 0;
        for (address, settings) in &loaded {
            if registry.restore(*address, settings) {
                restored += 1;
            }
        }
        drop(registry);

        if restored < loaded.len() {
            tracing::warn!(
                restored,
                persisted = loaded.len(),
                "Registry full, some persisted devices were not restored"
            );
        }
        tracing::info!(restored, "Restored devices from settings store");
        Ok(restored)
    }

    /// Ingests one advertisement from the local radio.
    pub async fn ingest_local(&self, advertisement: &LocalAdvertisement<'_>) -> ObservationStatus {
        let observation = local_observation(advertisement, self.now());
        self.observe(observation).await
    }

    /// Ingests one satellite submission from the relay at `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::MalformedSatellitePayload`] if the message cannot
    /// be parsed. Nothing is recorded in that case.
    ///
    /// [`HubError::MalformedSatellitePayload`]: crate::error::HubError::MalformedSatellitePayload
    pub async fn ingest_satellite(
        &self,
        message: &SatelliteMessage,
        ip: &str,
    ) -> Result<ObservationStatus> {
        let frame = message.parse().map_err(|e| {
            tracing::debug!(ip, mac = %message.mac, error = %e, "Dropping malformed satellite payload");
            e
        })?;
        let observation = satellite_observation(&frame, ip, self.now());
        Ok(self.observe(observation).await)
    }

    /// Merges a normalized observation into the registry.
    pub async fn observe(&self, mut observation: Observation) -> ObservationStatus {
        let address = observation.address;
        // Discovery may switch on before the write lock is taken, so any
        // absent address gets its persisted settings loaded.
        let known = self.registry.read().await.contains(address);
        let inherited = if known {
            None
        } else {
            self.load_or_default(address)
        };

        let mut registry = self.registry.write().await;
        // Stamped under the lock so last_seen never moves backwards.
        observation.at = self.now();
        let status = registry.apply_observation(observation, inherited.as_ref());
        drop(registry);

        tracing::trace!(%address, ?status, "Observation applied");
        status
    }

    /// Persisted settings for `address`, or `None` when absent or unreadable.
    fn load_or_default(&self, address: MacAddress) -> Option<DeviceSettings> {
        load_settings(self.store.as_ref(), address).unwrap_or_else(|e| {
            tracing::warn!(%address, error = %e, "Failed to load device settings, using defaults");
            None
        })
    }

    /// Claims the next slot in store-write order. Call while still holding
    /// the registry write guard.
    async fn write_slot(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.write_order).lock_owned().await
    }

    /// Writes settings on the blocking pool. The slot is released when the
    /// write finishes, even if the caller is cancelled first.
    async fn persist(&self, slot: OwnedMutexGuard<()>, changed: Vec<(MacAddress, DeviceSettings)>) {
        if changed.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let written = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            for (address, settings) in &changed {
                if let Err(e) = save_settings(store.as_ref(), *address, settings) {
                    tracing::warn!(%address, error = %e, "Failed to persist device settings");
                }
            }
        })
        .await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Settings write task failed");
        }
    }

    /// Turns discovery mode on.
    pub async fn start_discovery(&self) {
        self.registry.write().await.set_discovery(true);
        tracing::info!("Discovery mode started");
    }

    /// Turns discovery mode off.
    pub async fn stop_discovery(&self) {
        self.registry.write().await.set_discovery(false);
        tracing::info!("Discovery mode stopped");
    }

    /// Whether discovery mode is on.
    pub async fn is_discovering(&self) -> bool {
        self.registry.read().await.is_discovering()
    }

    /// Shows or hides a device and persists the change.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`](crate::error::HubError::DeviceNotFound)
    /// for an untracked address.
    pub async fn set_visibility(&self, address: MacAddress, visible: bool) -> Result<DeviceSettings> {
        let mut registry = self.registry.write().await;
        let settings = registry.set_visibility(address, visible)?;
        let slot = self.write_slot().await;
        drop(registry);

        self.persist(slot, vec![(address, settings.clone())]).await;
        tracing::info!(%address, visible, "Device visibility set");
        Ok(settings)
    }

    /// Flips a device's visibility and persists the change.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`](crate::error::HubError::DeviceNotFound)
    /// for an untracked address.
    pub async fn toggle_visibility(&self, address: MacAddress) -> Result<DeviceSettings> {
        let mut registry = self.registry.write().await;
        let settings = registry.toggle_visibility(address)?;
        let slot = self.write_slot().await;
        drop(registry);

        self.persist(slot, vec![(address, settings.clone())]).await;
        tracing::info!(%address, visible = settings.visible, "Device visibility toggled");
        Ok(settings)
    }

    /// Hides every device. Returns how many changed.
    pub async fn clear_visibility(&self) -> usize {
        let mut registry = self.registry.write().await;
        let changed = registry.clear_visibility();
        let slot = self.write_slot().await;
        drop(registry);

        let count = changed.len();
        self.persist(slot, changed).await;
        tracing::info!(count, "Cleared device visibility");
        count
    }

    /// Applies display settings, optionally to every similar device.
    ///
    /// Returns how many devices were updated.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DeviceNotFound`](crate::error::HubError::DeviceNotFound)
    /// for an untracked address.
    pub async fn update_settings(
        &self,
        address: MacAddress,
        update: &SettingsUpdate,
        propagate: bool,
    ) -> Result<usize> {
        let mut registry = self.registry.write().await;
        let updated = registry.update_settings(address, update, propagate)?;
        let slot = self.write_slot().await;
        drop(registry);

        let count = updated.len();
        self.persist(slot, updated).await;
        tracing::info!(%address, propagate, count, "Device settings updated");
        Ok(count)
    }

    /// Device views in address order.
    pub async fn snapshot(&self, include_hidden: bool) -> Vec<DeviceView> {
        let now = self.now();
        self.registry.read().await.snapshot(include_hidden, now)
    }

    /// Registry counters.
    pub async fn stats(&self) -> HubStats {
        let registry = self.registry.read().await;
        HubStats {
            devices: registry.len(),
            visible: registry.visible_count(),
            discovering: registry.is_discovering(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use crate::registry::DropReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::{
        JsonFileStore, MemoryStore, SettingKey, StoreError, StoreResult, StoredValue,
    };

    const MAC: &str = "A4:C1:38:0A:1B:2C";

    /// Flags plus a pvvx block reading 21.50 C / 45 %.
    const PVVX_HEX: &str = "02010612161a182c1b0a38c1a46608a411860b510704";

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _key: &SettingKey) -> StoreResult<Option<StoredValue>> {
            Err(StoreError::Unavailable("offline".into()))
        }

        fn set_many(&self, _entries: Vec<(SettingKey, StoredValue)>) -> StoreResult<()> {
            Err(StoreError::Unavailable("offline".into()))
        }

        fn keys(&self) -> StoreResult<Vec<SettingKey>> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    fn mac() -> MacAddress {
        MAC.parse().unwrap()
    }

    fn hub_with(store: Arc<dyn SettingsStore>, discovering: bool) -> Hub {
        let config = RegistryConfig {
            discovery_on_start: discovering,
            ..RegistryConfig::default()
        };
        Hub::new(&config, store)
    }

    fn satellite(name: Option<&str>) -> SatelliteMessage {
        SatelliteMessage {
            mac: MAC.into(),
            rssi: -70,
            data: PVVX_HEX.into(),
            name: name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_satellite_ingest_creates_device_in_discovery() {
        let hub = hub_with(Arc::new(MemoryStore::new()), true);
        let status = hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(status, ObservationStatus::Created);

        let devices = hub.snapshot(true).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].temperature, Some(21.5));
        assert_eq!(devices[0].satellite_ip.as_deref(), Some("10.0.0.5"));
        assert!(hub.snapshot(false).await.is_empty());
    }

    #[tokio::test]
    async fn test_satellite_ingest_ignored_when_monitoring() {
        let hub = hub_with(Arc::new(MemoryStore::new()), false);
        let status = hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(status, ObservationStatus::Dropped(DropReason::UnknownDevice));
        assert_eq!(hub.stats().await.devices, 0);
    }

    #[tokio::test]
    async fn test_malformed_satellite_payload_records_nothing() {
        let hub = hub_with(Arc::new(MemoryStore::new()), true);
        let mut message = satellite(None);
        message.data.pop();
        let err = hub.ingest_satellite(&message, "10.0.0.5").await.unwrap_err();
        assert!(matches!(err, HubError::MalformedSatellitePayload(_)));
        assert_eq!(hub.stats().await.devices, 0);
    }

    #[tokio::test]
    async fn test_local_ingest() {
        let hub = hub_with(Arc::new(MemoryStore::new()), true);
        let raw = crate::ingest::decode_hex(PVVX_HEX).unwrap();
        let advertisement = LocalAdvertisement::from_raw(mac(), -48, &raw);
        assert_eq!(hub.ingest_local(&advertisement).await, ObservationStatus::Created);
        let view = &hub.snapshot(true).await[0];
        assert_eq!(view.source, "local");
        assert_eq!(view.rssi, -48);
    }

    #[tokio::test]
    async fn test_visibility_is_persisted_and_restored() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let hub = hub_with(store.clone(), true);
        hub.ingest_satellite(&satellite(Some("Sauna")), "10.0.0.5")
            .await
            .unwrap();
        hub.set_visibility(mac(), true).await.unwrap();

        let restarted = hub_with(store, false);
        assert_eq!(restarted.restore().await.unwrap(), 1);
        let devices = restarted.snapshot(false).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Sauna");
        assert_eq!(devices[0].temperature, None);

        let status = restarted
            .ingest_satellite(&satellite(None), "10.0.0.6")
            .await
            .unwrap();
        assert_eq!(status, ObservationStatus::Updated);
    }

    #[tokio::test]
    async fn test_discovered_device_inherits_persisted_settings() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let settings = DeviceSettings {
            name: "Porch".into(),
            user_named: true,
            visible: true,
            ..DeviceSettings::default()
        };
        save_settings(store.as_ref(), mac(), &settings).unwrap();

        let hub = hub_with(store, true);
        hub.ingest_satellite(&satellite(Some("ATC_0A1B2C")), "10.0.0.5")
            .await
            .unwrap();
        let view = &hub.snapshot(false).await[0];
        assert_eq!(view.name, "Porch");
        assert!(view.user_named);
    }

    #[tokio::test]
    async fn test_broken_store_falls_back_to_defaults() {
        let hub = hub_with(Arc::new(BrokenStore), true);
        let status = hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(status, ObservationStatus::Created);
        assert!(hub.toggle_visibility(mac()).await.unwrap().visible);
        assert!(hub.restore().await.is_err());
    }

    #[tokio::test]
    async fn test_discovery_toggle() {
        let hub = hub_with(Arc::new(MemoryStore::new()), false);
        assert!(!hub.is_discovering().await);
        hub.start_discovery().await;
        assert!(hub.stats().await.discovering);
        hub.stop_discovery().await;
        assert!(!hub.is_discovering().await);
    }

    #[tokio::test]
    async fn test_update_settings_counts_and_persists() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let hub = hub_with(store.clone(), true);
        hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        let update = SettingsUpdate {
            name: Some("Cellar".into()),
            show_mac: false,
            show_ip: false,
            field_mask: 0x3,
        };
        assert_eq!(hub.update_settings(mac(), &update, true).await.unwrap(), 1);

        let persisted = load_settings(store.as_ref(), mac()).unwrap().unwrap();
        assert_eq!(persisted.name, "Cellar");
        assert!(persisted.user_named);
        assert_eq!(persisted.field_mask, 0x3);

        let missing: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        assert!(matches!(
            hub.update_settings(missing, &update, false).await,
            Err(HubError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_visibility_on_unknown_device() {
        let hub = hub_with(Arc::new(MemoryStore::new()), true);
        tokio_test::block_on(async {
            tokio_test::assert_err!(hub.toggle_visibility(mac()).await);
            tokio_test::assert_ok!(hub.ingest_satellite(&satellite(None), "10.0.0.5").await);
            let settings = tokio_test::assert_ok!(hub.set_visibility(mac(), false).await);
            assert!(!settings.visible);
        });
    }

    #[tokio::test]
    async fn test_clear_visibility() {
        let hub = hub_with(Arc::new(MemoryStore::new()), true);
        hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        hub.set_visibility(mac(), true).await.unwrap();
        assert_eq!(hub.clear_visibility().await, 1);
        assert_eq!(hub.clear_visibility().await, 0);
        assert_eq!(hub.stats().await.devices, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_from_both_channels() {
        let hub = Arc::new(hub_with(Arc::new(MemoryStore::new()), true));
        let raw = crate::ingest::decode_hex(PVVX_HEX).unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let hub = Arc::clone(&hub);
            let raw = raw.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
                } else {
                    let advertisement = LocalAdvertisement::from_raw(mac(), -50, &raw);
                    hub.ingest_local(&advertisement).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let devices = hub.snapshot(true).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].interval.samples, 19);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_visibility_writes_match_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::open(path.clone()).unwrap());
        let hub = Arc::new(hub_with(store, true));
        hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                if i % 3 == 0 {
                    hub.set_visibility(mac(), i % 2 == 0).await.unwrap();
                } else {
                    hub.toggle_visibility(mac()).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let in_memory = hub.snapshot(true).await[0].visible;
        let reopened = JsonFileStore::open(path).unwrap();
        let persisted = load_settings(&reopened, mac()).unwrap().unwrap();
        assert_eq!(persisted.visible, in_memory);
    }

    /// Memory store that counts reads.
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    impl SettingsStore for CountingStore {
        fn get(&self, key: &SettingKey) -> StoreResult<Option<StoredValue>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set_many(&self, entries: Vec<(SettingKey, StoredValue)>) -> StoreResult<()> {
            self.inner.set_many(entries)
        }

        fn keys(&self) -> StoreResult<Vec<SettingKey>> {
            self.inner.keys()
        }
    }

    #[tokio::test]
    async fn test_settings_loaded_for_absent_address_in_any_mode() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            reads: AtomicUsize::new(0),
        });
        let settings = DeviceSettings {
            name: "Porch".into(),
            user_named: true,
            ..DeviceSettings::default()
        };
        save_settings(store.as_ref(), mac(), &settings).unwrap();

        let hub = hub_with(store.clone(), false);
        let status = hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(status, ObservationStatus::Dropped(DropReason::UnknownDevice));
        assert!(store.reads.load(Ordering::SeqCst) > 0);

        hub.start_discovery().await;
        hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(hub.snapshot(true).await[0].name, "Porch");

        // Tracked devices never go back to the store.
        let reads = store.reads.load(Ordering::SeqCst);
        hub.ingest_satellite(&satellite(None), "10.0.0.5").await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), reads);
    }
}
