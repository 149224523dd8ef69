//! In-memory BLE backend for testing.
//!
//! [`MockCentral`] and [`MockPeripheral`] implement [`BleCentral`] and
//! [`BleLink`] without any Bluetooth hardware, so the connection manager can
//! be exercised end to end in tests.
//!
//! # Features
//!
//! - **Scripted discovery**: push peripherals (or scan errors) into a scan
//! - **Telemetry injection**: send text payloads on any characteristic
//! - **Failure injection**: fail connect, discovery, subscription or writes
//! - **Link loss**: end every subscription as a dropped connection would
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use anemoi_core::{ConnectionManager, MockCentral, TelemetryStore};
//! use anemoi_types::PeripheralHandle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let central = MockCentral::new();
//!     let handle = PeripheralHandle::new("MOCK-1", Some("Anemoi Analyzer Nano".into()));
//!     let peripheral = central.add_peripheral(handle.clone()).await;
//!
//!     let manager = ConnectionManager::new(central, Arc::new(TelemetryStore::new()));
//!     manager.connect(&handle).await.unwrap();
//!     assert_eq!(peripheral.subscription_count().await, 6);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anemoi_types::PeripheralHandle;
use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::decoder::ValueEncoding;
use crate::error::{Error, Result};
use crate::transport::{
    BleCentral, BleLink, Discovery, DiscoveryStream, Notification, NotificationStream,
};

/// A mock BLE central for testing.
pub struct MockCentral {
    encoding: ValueEncoding,
    scanning: AtomicBool,
    scan_tx: Mutex<Option<UnboundedSender<Result<Discovery>>>>,
    pending: Mutex<Vec<Result<Discovery>>>,
    peripherals: RwLock<HashMap<String, MockPeripheral>>,
    scan_starts: AtomicU32,
    scan_stops: AtomicU32,
    connect_count: AtomicU32,
    fail_connect: AtomicBool,
}

impl std::fmt::Debug for MockCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCentral")
            .field("encoding", &self.encoding)
            .field("scanning", &self.scanning.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCentral {
    /// Create a mock central whose peripherals hand over raw UTF-8 values.
    pub fn new() -> Self {
        Self::with_encoding(ValueEncoding::Utf8)
    }

    /// Create a mock central whose peripherals use `encoding`.
    pub fn with_encoding(encoding: ValueEncoding) -> Self {
        Self {
            encoding,
            scanning: AtomicBool::new(false),
            scan_tx: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            peripherals: RwLock::new(HashMap::new()),
            scan_starts: AtomicU32::new(0),
            scan_stops: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            fail_connect: AtomicBool::new(false),
        }
    }

    /// Register a connectable peripheral and return its control handle.
    pub async fn add_peripheral(&self, handle: PeripheralHandle) -> MockPeripheral {
        let peripheral = MockPeripheral::new(handle.clone(), self.encoding);
        self.peripherals
            .write()
            .await
            .insert(handle.id, peripheral.clone());
        peripheral
    }

    /// Report a peripheral to the running scan, or queue it for the next one.
    pub async fn discover(&self, handle: PeripheralHandle) {
        self.emit(Ok(Discovery::new(handle))).await;
    }

    /// Report a peripheral with a signal strength.
    pub async fn discover_with_rssi(&self, handle: PeripheralHandle, rssi: i16) {
        self.emit(Ok(Discovery {
            handle,
            rssi: Some(rssi),
        }))
        .await;
    }

    /// Report a scan error.
    pub async fn scan_error(&self, message: &str) {
        self.emit(Err(Error::Bluetooth(btleplug::Error::RuntimeError(
            message.to_string(),
        ))))
        .await;
    }

    async fn emit(&self, item: Result<Discovery>) {
        let scan_tx = self.scan_tx.lock().await;
        match scan_tx.as_ref() {
            Some(tx) => {
                let _ = tx.unbounded_send(item);
            }
            None => self.pending.lock().await.push(item),
        }
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Number of scans started.
    pub fn scan_start_count(&self) -> u32 {
        self.scan_starts.load(Ordering::Relaxed)
    }

    /// Number of times a scan was stopped.
    pub fn scan_stop_count(&self) -> u32 {
        self.scan_stops.load(Ordering::Relaxed)
    }

    /// Number of connect attempts.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Make every connect attempt fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl BleCentral for MockCentral {
    type Link = MockPeripheral;

    async fn start_scan(&self) -> Result<DiscoveryStream> {
        let (tx, rx) = unbounded();
        for item in self.pending.lock().await.drain(..) {
            let _ = tx.unbounded_send(item);
        }
        *self.scan_tx.lock().await = Some(tx);
        self.scanning.store(true, Ordering::Relaxed);
        self.scan_starts.fetch_add(1, Ordering::Relaxed);
        Ok(Box::pin(rx))
    }

    async fn stop_scan(&self) -> Result<()> {
        // Dropping the sender ends the scan stream.
        self.scan_tx.lock().await.take();
        self.scanning.store(false, Ordering::Relaxed);
        self.scan_stops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<MockPeripheral> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::DeviceNotFound));
        }
        let peripheral = self
            .peripherals
            .read()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(&handle.id))?;
        peripheral.state.connected.store(true, Ordering::Relaxed);
        Ok(peripheral)
    }
}

struct PeripheralState {
    handle: PeripheralHandle,
    encoding: ValueEncoding,
    connected: AtomicBool,
    subscribers: Mutex<Vec<(Uuid, UnboundedSender<Notification>)>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    subscribe_count: AtomicU32,
    disconnect_count: AtomicU32,
    fail_discover: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_write: AtomicBool,
}

/// A mock peripheral: the control handle and the link are the same object.
///
/// Clones share state, so a test can keep one clone while the manager owns
/// another.
#[derive(Clone)]
pub struct MockPeripheral {
    state: Arc<PeripheralState>,
}

impl std::fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("handle", &self.state.handle)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MockPeripheral {
    /// Create a disconnected mock peripheral.
    pub fn new(handle: PeripheralHandle, encoding: ValueEncoding) -> Self {
        Self {
            state: Arc::new(PeripheralState {
                handle,
                encoding,
                connected: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
                subscribe_count: AtomicU32::new(0),
                disconnect_count: AtomicU32::new(0),
                fail_discover: AtomicBool::new(false),
                fail_subscribe: AtomicBool::new(false),
                fail_write: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Relaxed)
    }

    /// Send a text payload on a characteristic, encoded the way this
    /// peripheral's platform delivers values.
    ///
    /// Returns the number of subscriptions that received it.
    pub async fn notify(&self, characteristic: Uuid, text: &str) -> usize {
        let value = self.state.encoding.encode(text.as_bytes());
        self.notify_raw(Notification::new(characteristic, value)).await
    }

    /// Send a notification exactly as given.
    pub async fn notify_raw(&self, notification: Notification) -> usize {
        let subscribers = self.state.subscribers.lock().await;
        subscribers
            .iter()
            .filter(|(uuid, _)| *uuid == notification.characteristic)
            .filter(|(_, tx)| tx.unbounded_send(notification.clone()).is_ok())
            .count()
    }

    /// Drop the link as if the analyzer went out of range.
    pub async fn drop_link(&self) {
        self.state.connected.store(false, Ordering::Relaxed);
        self.state.subscribers.lock().await.clear();
    }

    /// Values written so far, oldest first.
    pub async fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.writes.lock().await.clone()
    }

    /// Number of successful subscriptions.
    pub async fn subscription_count(&self) -> u32 {
        self.state.subscribe_count.load(Ordering::Relaxed)
    }

    /// Number of disconnect requests.
    pub fn disconnect_count(&self) -> u32 {
        self.state.disconnect_count.load(Ordering::Relaxed)
    }

    /// Make service discovery fail.
    pub fn set_fail_discover(&self, fail: bool) {
        self.state.fail_discover.store(fail, Ordering::Relaxed);
    }

    /// Make subscriptions fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// Make writes fail.
    pub fn set_fail_write(&self, fail: bool) {
        self.state.fail_write.store(fail, Ordering::Relaxed);
    }

    fn check_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl BleLink for MockPeripheral {
    fn handle(&self) -> &PeripheralHandle {
        &self.state.handle
    }

    fn value_encoding(&self) -> ValueEncoding {
        self.state.encoding
    }

    async fn discover(&self) -> Result<()> {
        self.check_connected()?;
        if self.state.fail_discover.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::RuntimeError(
                "mock discovery failure".to_string(),
            )));
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.check_connected()?;
        if self.state.fail_subscribe.load(Ordering::Relaxed) {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 1));
        }
        let (tx, rx) = unbounded();
        self.state
            .subscribers
            .lock()
            .await
            .push((characteristic, tx));
        self.state.subscribe_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::pin(rx))
    }

    async fn write_with_response(&self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        self.check_connected()?;
        if self.state.fail_write.load(Ordering::Relaxed) {
            return Err(Error::WriteFailed {
                uuid: characteristic.to_string(),
                reason: "mock write failure".to_string(),
            });
        }
        self.state
            .writes
            .lock()
            .await
            .push((characteristic, value.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnect_count.fetch_add(1, Ordering::Relaxed);
        let was_connected = self.state.connected.swap(false, Ordering::Relaxed);
        self.state.subscribers.lock().await.clear();
        if was_connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemoi_types::ble;
    use futures::StreamExt;

    fn analyzer() -> PeripheralHandle {
        PeripheralHandle::new("MOCK-1", Some("Anemoi Analyzer Nano".into()))
    }

    #[tokio::test]
    async fn test_pending_discoveries_flush_on_scan_start() {
        let central = MockCentral::new();
        central.discover(analyzer()).await;
        central.scan_error("adapter hiccup").await;

        let mut scan = central.start_scan().await.unwrap();
        assert!(central.is_scanning());
        assert_eq!(scan.next().await.unwrap().unwrap().handle, analyzer());
        assert!(scan.next().await.unwrap().is_err());

        central.stop_scan().await.unwrap();
        assert!(!central.is_scanning());
        assert!(scan.next().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_unknown_peripheral() {
        let central = MockCentral::new();
        let err = central.connect(&analyzer()).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_notify_reaches_matching_subscription_only() {
        let central = MockCentral::with_encoding(ValueEncoding::Base64);
        let peripheral = central.add_peripheral(analyzer()).await;
        let link = central.connect(&analyzer()).await.unwrap();

        let mut temperature = link.subscribe(ble::TEMPERATURE).await.unwrap();
        let _pressure = link.subscribe(ble::ATMOSPHERIC_PRESSURE).await.unwrap();

        assert_eq!(peripheral.notify(ble::TEMPERATURE, "23.50\n").await, 1);
        let n = temperature.next().await.unwrap();
        assert_eq!(n.characteristic, ble::TEMPERATURE);
        assert_eq!(n.value.as_deref(), Some(&b"MjMuNTAK"[..]));
    }

    #[tokio::test]
    async fn test_disconnect_twice_reports_not_connected() {
        let central = MockCentral::new();
        central.add_peripheral(analyzer()).await;
        let link = central.connect(&analyzer()).await.unwrap();

        let mut stream = link.subscribe(ble::TEMPERATURE).await.unwrap();
        link.disconnect().await.unwrap();
        assert!(stream.next().await.is_none());
        assert!(matches!(link.disconnect().await, Err(Error::NotConnected)));
        assert_eq!(link.disconnect_count(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let central = MockCentral::new();
        let peripheral = central.add_peripheral(analyzer()).await;
        let link = central.connect(&analyzer()).await.unwrap();

        link.write_with_response(ble::CALIBRATE, b"CAL").await.unwrap();
        peripheral.set_fail_write(true);
        assert!(matches!(
            link.write_with_response(ble::CALIBRATE, b"CAL").await,
            Err(Error::WriteFailed { .. })
        ));
        assert_eq!(peripheral.writes().await, vec![(ble::CALIBRATE, b"CAL".to_vec())]);
    }
}
