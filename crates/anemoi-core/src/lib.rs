//! Telemetry acquisition for the Anemoi gas analyzer.
//!
//! This crate turns the analyzer's intermittent, text-encoded BLE
//! notifications into one consistent application state, and keeps live
//! charts from the WebSocket gateway that some installations run.
//!
//! # Features
//!
//! - **Discovery**: Scan for nearby analyzers by advertised name
//! - **Connection management**: One active analyzer, typed failure stages
//! - **Decoding**: Per-channel text values or one composite JSON document
//! - **Calibration**: Send the `CAL` command to the connected analyzer
//! - **Observable state**: Snapshots published through a `watch` channel
//! - **WebSocket bridge**: 60-point sliding charts from gateway frames
//! - **Measurement history**: Saved sensor voltages for drift tracking
//!
//! # Platform Differences
//!
//! Peripheral identities vary by platform. On macOS they are UUIDs assigned
//! by CoreBluetooth; on Linux and Windows they are Bluetooth MAC addresses
//! (e.g. `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use anemoi_core::{BtleCentral, ConnectionManager, TelemetryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(TelemetryStore::new());
//!     let manager = ConnectionManager::new(BtleCentral::new().await?, Arc::clone(&store));
//!
//!     manager.start_scan().await?;
//!     let mut rx = store.subscribe();
//!     let snapshot = rx.wait_for(|s| !s.devices.is_empty()).await?.clone();
//!
//!     manager.connect(&snapshot.devices[0]).await?;
//!     while rx.changed().await.is_ok() {
//!         let telemetry = rx.borrow().telemetry;
//!         println!("O2 {:.1}%  He {:.1}%", telemetry.percentage_o2, telemetry.percentage_he);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod btle;
pub mod commands;
pub mod decoder;
pub mod error;
pub mod history;
pub mod manager;
pub mod mock;
pub mod scan;
pub mod series;
pub mod store;
pub mod transport;
pub mod util;

// BLE UUIDs and the device name marker
pub use anemoi_types::ble;

// Core exports
pub use bridge::{BridgeClient, BridgeConfig, BridgeFrame, ChartSet, MalformedFramePolicy, ReadyState};
pub use btle::{BtleCentral, BtleLink};
pub use decoder::{TelemetryDecoder, TelemetryUpdate, ValueEncoding};
pub use error::{ConnectStage, DeviceNotFoundReason, Error, Result};
pub use history::MeasurementHistory;
pub use manager::{ConnectionManager, ManagerConfig};
pub use mock::{MockCentral, MockPeripheral};
pub use scan::{ScanOptions, scan_with_options};
pub use series::{SeriesBuffer, TimeSeriesPoint};
pub use store::{ConnectionState, DisconnectPolicy, LateUpdatePolicy, Snapshot, TelemetryStore};
pub use transport::{BleCentral, BleLink, Discovery, Notification};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from anemoi-types
pub use anemoi_types::{
    Humidity, MeasurementSample, PeripheralHandle, TelemetryChannel, TelemetryRecord,
};
