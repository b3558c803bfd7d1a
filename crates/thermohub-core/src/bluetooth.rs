//! Local BLE scanner on BlueZ.
//!
//! The scanner runs LE discovery with duplicate reporting on and forwards
//! every added or changed device to [`Hub::ingest_local`]. BlueZ only
//! exposes parsed properties, so each event is re-encoded with
//! [`AdvertisementBuilder`] before it reaches the shared parser.

use std::sync::Arc;

use bluer::{Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;

use crate::advertisement::{uuid_to_u16, AdvertisementBuilder};
use crate::decoder::{BTHOME_UUID, ENVIRONMENTAL_SENSING_UUID, MIBEACON_UUID};
use crate::error::{HubError, Result};
use crate::hub::Hub;
use crate::ingest::LocalAdvertisement;
use crate::registry::ObservationStatus;
use crate::types::MacAddress;

impl From<bluer::Error> for HubError {
    fn from(err: bluer::Error) -> Self {
        Self::BluetoothUnavailable(err.to_string())
    }
}

/// A powered adapter ready to scan.
pub struct LocalScanner {
    adapter: Adapter,
    // Dropping the session tears down the D-Bus connection.
    _session: Session,
}

impl std::fmt::Debug for LocalScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScanner")
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl LocalScanner {
    /// Opens the named adapter, or the default one, and powers it on.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BluetoothUnavailable`] if BlueZ or the adapter
    /// cannot be reached.
    pub async fn open(adapter_name: Option<&str>) -> Result<Self> {
        let session = Session::new().await?;
        let adapter = match adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        adapter.set_powered(true).await?;

        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };
        if let Err(e) = adapter.set_discovery_filter(filter).await {
            tracing::warn!(error = %e, "Failed to set discovery filter");
        }

        tracing::info!(adapter = adapter.name(), "Bluetooth adapter ready");
        Ok(Self {
            adapter,
            _session: session,
        })
    }

    /// Scans until the discovery stream ends.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BluetoothUnavailable`] if discovery cannot start.
    pub async fn run(self, hub: Arc<Hub>) -> Result<()> {
        let events = self.adapter.discover_devices_with_changes().await?;
        futures::pin_mut!(events);
        tracing::info!("Local BLE scan started");

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match self.read_advertisement(address).await {
                Ok(Some((rssi, raw))) => {
                    let advertisement =
                        LocalAdvertisement::from_raw(MacAddress::new(address.0), rssi, &raw);
                    let status = hub.ingest_local(&advertisement).await;
                    if status == ObservationStatus::Created {
                        tracing::debug!(%address, "Local scan discovered device");
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(%address, error = %e, "Failed to read device properties"),
            }
        }

        tracing::warn!("Local BLE scan ended");
        Ok(())
    }

    /// RSSI and re-encoded advertisement for one device, `None` when the
    /// device has no current RSSI (cached, not in range).
    async fn read_advertisement(&self, address: Address) -> bluer::Result<Option<(i8, Vec<u8>)>> {
        let device: Device = self.adapter.device(address)?;
        let Some(rssi) = device.rssi().await? else {
            return Ok(None);
        };
        let rssi = i8::try_from(rssi).unwrap_or(i8::MIN);

        let mut builder = AdvertisementBuilder::new();
        if let Some(name) = device.name().await? {
            builder = builder.name(&name);
        }
        if let Some(tx_power) = device.tx_power().await? {
            builder = builder.tx_power(i8::try_from(tx_power).unwrap_or_default());
        }
        if let Some(data) = device.manufacturer_data().await? {
            if let Some((company_id, payload)) = data.iter().min_by_key(|(id, _)| **id) {
                builder = builder.manufacturer(*company_id, payload);
            }
        }
        if let Some(data) = device.service_data().await? {
            let mut short: Vec<(u16, &Vec<u8>)> = data
                .iter()
                .filter_map(|(uuid, payload)| Some((uuid_to_u16(uuid)?, payload)))
                .collect();
            // Only one service-data element is kept; prefer a decodable one.
            short.sort_by_key(|(uuid, _)| {
                let decodable = matches!(
                    *uuid,
                    ENVIRONMENTAL_SENSING_UUID | MIBEACON_UUID | BTHOME_UUID
                );
                (!decodable, *uuid)
            });
            if let Some((uuid, payload)) = short.first() {
                builder = builder.service_data(*uuid, payload);
            }
        }

        Ok(Some((rssi, builder.build())))
    }
}
