//! btleplug backend.
//!
//! [`BtleCentral`] and [`BtleLink`] put the platform Bluetooth stack behind
//! the [`BleCentral`] and [`BleLink`] traits. btleplug hands characteristic
//! values over as raw bytes, so links report [`ValueEncoding::Utf8`].

use std::collections::HashMap;

use anemoi_types::PeripheralHandle;
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::future::ready;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decoder::ValueEncoding;
use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::transport::{
    BleCentral, BleLink, Discovery, DiscoveryStream, Notification, NotificationStream,
};
use crate::util::{create_identifier, format_peripheral_id};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Identity and name of a peripheral as the adapter currently knows it.
async fn handle_for(peripheral: &Peripheral) -> Result<(PeripheralHandle, Option<i16>)> {
    let properties = peripheral.properties().await?;
    let id = properties
        .as_ref()
        .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
        .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));
    let name = properties.as_ref().and_then(|p| p.local_name.clone());
    let rssi = properties.as_ref().and_then(|p| p.rssi);
    Ok((PeripheralHandle::new(id, name), rssi))
}

async fn discovery_for(adapter: &Adapter, id: &PeripheralId) -> Result<Discovery> {
    let peripheral = adapter.peripheral(id).await?;
    let (handle, rssi) = handle_for(&peripheral).await?;
    Ok(Discovery { handle, rssi })
}

/// BLE central backed by the first system adapter.
#[derive(Debug, Clone)]
pub struct BtleCentral {
    adapter: Adapter,
}

impl BtleCentral {
    /// Open the first available adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    async fn find_peripheral(&self, handle: &PeripheralHandle) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            let (known, _) = handle_for(&peripheral).await?;
            if known.id == handle.id || format_peripheral_id(&peripheral.id()) == handle.id {
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(&handle.id))
    }
}

#[async_trait]
impl BleCentral for BtleCentral {
    type Link = BtleLink;

    async fn start_scan(&self) -> Result<DiscoveryStream> {
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        debug!("Adapter scan started");

        let adapter = self.adapter.clone();
        let discoveries = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        Some(discovery_for(&adapter, &id).await)
                    }
                    _ => None,
                }
            }
        });
        Ok(Box::pin(discoveries))
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<BtleLink> {
        let peripheral = self.find_peripheral(handle).await?;
        info!(device = %handle, "Connecting to peripheral");
        peripheral.connect().await?;
        Ok(BtleLink {
            adapter: self.adapter.clone(),
            peripheral,
            handle: handle.clone(),
            characteristics_cache: RwLock::new(HashMap::new()),
        })
    }
}

/// A connected peripheral.
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Peripheral,
    handle: PeripheralHandle,
    /// Built after service discovery.
    characteristics_cache: RwLock<HashMap<Uuid, Characteristic>>,
}

impl std::fmt::Debug for BtleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleLink")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl BtleLink {
    async fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics_cache
            .read()
            .await
            .get(&uuid)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(uuid.to_string(), self.peripheral.services().len())
            })
    }
}

#[async_trait]
impl BleLink for BtleLink {
    fn handle(&self) -> &PeripheralHandle {
        &self.handle
    }

    fn value_encoding(&self) -> ValueEncoding {
        ValueEncoding::Utf8
    }

    async fn discover(&self) -> Result<()> {
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        debug!("Found {} services", services.len());

        let mut cache = self.characteristics_cache.write().await;
        cache.clear();
        for service in &services {
            debug!("  Service: {}", service.uuid);
            for char in &service.characteristics {
                debug!("    Characteristic: {}", char.uuid);
                cache.insert(char.uuid, char.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let target = self.find_characteristic(characteristic).await?;
        self.peripheral.subscribe(&target).await?;

        // Not every platform closes the notification stream when the link
        // drops, so also end it on the adapter's disconnect event.
        let id = self.peripheral.id();
        let lost = self
            .adapter
            .events()
            .await?
            .filter(move |event| {
                ready(matches!(event, CentralEvent::DeviceDisconnected(d) if *d == id))
            })
            .into_future();

        let notifications = self
            .peripheral
            .notifications()
            .await?
            .filter(move |n| ready(n.uuid == characteristic))
            .map(|n| {
                if n.value.is_empty() {
                    Notification::empty(n.uuid)
                } else {
                    Notification::new(n.uuid, n.value)
                }
            })
            .take_until(lost);
        Ok(Box::pin(notifications))
    }

    async fn write_with_response(&self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        let target = self.find_characteristic(characteristic).await?;
        self.peripheral
            .write(&target, value, WriteType::WithResponse)
            .await
            .map_err(|e| Error::WriteFailed {
                uuid: characteristic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Err(Error::NotConnected);
        }
        match self.peripheral.disconnect().await {
            Ok(()) => Ok(()),
            Err(btleplug::Error::NotConnected) => Err(Error::NotConnected),
            Err(e) => {
                warn!(error = %e, "Peripheral disconnect failed");
                Err(e.into())
            }
        }
    }
}
