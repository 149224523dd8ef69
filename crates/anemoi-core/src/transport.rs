//! Trait abstractions over the platform BLE stack.
//!
//! The acquisition layer never talks to a Bluetooth library directly. It
//! drives a [`BleCentral`] (scan + connect) and the [`BleLink`] it returns
//! (discover, subscribe, write, disconnect). [`crate::btle`] implements these
//! on top of btleplug and [`crate::mock`] implements them in memory for tests.

use std::pin::Pin;

use anemoi_types::PeripheralHandle;
use async_trait::async_trait;
use futures::stream::Stream;
use uuid::Uuid;

use crate::decoder::ValueEncoding;
use crate::error::Result;

/// A peripheral reported by an active scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    /// Identity and advertised name.
    pub handle: PeripheralHandle,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

impl Discovery {
    /// Create a discovery without RSSI.
    pub fn new(handle: PeripheralHandle) -> Self {
        Self { handle, rssi: None }
    }
}

/// A value delivered by a characteristic subscription.
///
/// `value` is `None` when the platform delivered an update without a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The characteristic that produced the value.
    pub characteristic: Uuid,
    /// Raw value as delivered by the platform.
    pub value: Option<Vec<u8>>,
}

impl Notification {
    /// Create a notification carrying a payload.
    pub fn new(characteristic: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            value: Some(value.into()),
        }
    }

    /// Create a notification without a payload.
    pub fn empty(characteristic: Uuid) -> Self {
        Self {
            characteristic,
            value: None,
        }
    }
}

/// Stream of scan results. Individual items may be errors; the scan goes on.
pub type DiscoveryStream = Pin<Box<dyn Stream<Item = Result<Discovery>> + Send>>;

/// Stream of values from one characteristic subscription.
///
/// The stream ends when the link is lost or the subscription is torn down.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// A BLE central able to scan for peripherals and open links to them.
#[async_trait]
pub trait BleCentral: Send + Sync + 'static {
    /// The link type produced by [`connect`](Self::connect).
    type Link: BleLink;

    /// Start continuous discovery with no service filter.
    async fn start_scan(&self) -> Result<DiscoveryStream>;

    /// Stop an active scan. Stopping when idle is not an error.
    async fn stop_scan(&self) -> Result<()>;

    /// Establish a connection to a previously discovered peripheral.
    async fn connect(&self, handle: &PeripheralHandle) -> Result<Self::Link>;
}

/// An established connection to one peripheral.
#[async_trait]
pub trait BleLink: Send + Sync + 'static {
    /// The peripheral this link is connected to.
    fn handle(&self) -> &PeripheralHandle;

    /// How characteristic values are encoded on this platform.
    fn value_encoding(&self) -> ValueEncoding;

    /// Discover the service and characteristic topology.
    async fn discover(&self) -> Result<()>;

    /// Subscribe to notifications on a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Write a value to a characteristic and wait for the acknowledgement.
    async fn write_with_response(&self, characteristic: Uuid, value: &[u8]) -> Result<()>;

    /// Cancel the connection.
    async fn disconnect(&self) -> Result<()>;
}
