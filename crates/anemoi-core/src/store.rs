//! Observable telemetry state.
//!
//! [`TelemetryStore`] owns the one [`Snapshot`] the rest of the application
//! reads: the latest record, the discovered analyzers and the connection
//! state. Every change goes out as exactly one `watch` notification, so a
//! subscriber never sees half of an update.

use std::sync::atomic::{AtomicU64, Ordering};

use anemoi_types::{Humidity, PeripheralHandle, TelemetryRecord};
use tokio::sync::watch;
use tracing::debug;

use crate::decoder::TelemetryUpdate;

/// Connection lifecycle as seen by the display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No analyzer connected.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting(PeripheralHandle),
    /// Subscribed and receiving telemetry.
    Connected(PeripheralHandle),
}

impl ConnectionState {
    /// The connected analyzer, if any.
    pub fn connected(&self) -> Option<&PeripheralHandle> {
        match self {
            ConnectionState::Connected(handle) => Some(handle),
            _ => None,
        }
    }

    /// Whether an analyzer is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// What happens to the record when a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Every field returns to zero.
    #[default]
    ResetTelemetry,
    /// Fields keep their last received values.
    KeepLastKnown,
}

/// What happens to updates produced by a connection that is no longer active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateUpdatePolicy {
    /// Write them anyway.
    #[default]
    Apply,
    /// Discard them.
    DropStale,
}

/// Everything the display reads, published as one value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Latest normalized readings.
    pub telemetry: TelemetryRecord,
    /// Analyzers seen by the current scan, in discovery order.
    pub devices: Vec<PeripheralHandle>,
    /// Connection lifecycle.
    pub connection: ConnectionState,
    /// Relative humidity. Always unavailable on current hardware.
    pub humidity: Humidity,
}

/// Owner of the application [`Snapshot`].
#[derive(Debug)]
pub struct TelemetryStore {
    tx: watch::Sender<Snapshot>,
    session: AtomicU64,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    /// Create a store holding the zero baseline.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(Snapshot::default()),
            session: AtomicU64::new(0),
        }
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Current telemetry record.
    pub fn telemetry(&self) -> TelemetryRecord {
        self.tx.borrow().telemetry
    }

    /// Analyzers discovered so far.
    pub fn devices(&self) -> Vec<PeripheralHandle> {
        self.tx.borrow().devices.clone()
    }

    /// Current connection state.
    pub fn connection(&self) -> ConnectionState {
        self.tx.borrow().connection.clone()
    }

    /// Append a discovered analyzer unless one with the same identity is known.
    ///
    /// Returns `true` if the list changed. Subscribers are only notified when
    /// it did.
    pub fn add_device(&self, handle: PeripheralHandle) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.devices.contains(&handle) {
                return false;
            }
            debug!(device = %handle, "Discovered analyzer");
            snapshot.devices.push(handle);
            true
        })
    }

    /// Forget every discovered analyzer.
    pub fn reset_devices(&self) {
        self.tx.send_modify(|snapshot| snapshot.devices.clear());
    }

    /// Set the connection state.
    pub fn set_connection(&self, state: ConnectionState) {
        self.tx.send_modify(|snapshot| snapshot.connection = state);
    }

    /// Start a new connection session and return its epoch.
    pub(crate) fn begin_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark that no connection session is active.
    pub(crate) fn end_session(&self) {
        // Epoch 0 is never handed out, so no producer matches it.
        self.session.store(0, Ordering::SeqCst);
    }

    /// Epoch of the active connection session, or 0 when none is active.
    pub fn active_session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    /// Apply a decoded update produced under `session`.
    ///
    /// Returns `true` if the update was written.
    pub fn apply_update(
        &self,
        update: &TelemetryUpdate,
        session: u64,
        policy: LateUpdatePolicy,
    ) -> bool {
        if policy == LateUpdatePolicy::DropStale && session != self.active_session() {
            debug!(session, "Dropping update from inactive connection");
            return false;
        }
        self.tx
            .send_modify(|snapshot| update.apply(&mut snapshot.telemetry));
        true
    }

    /// Finish a connection: clear the connection state and, if asked, zero
    /// the record, in one notification.
    pub fn finish_connection(&self, policy: DisconnectPolicy) {
        self.tx.send_modify(|snapshot| {
            snapshot.connection = ConnectionState::Disconnected;
            if policy == DisconnectPolicy::ResetTelemetry {
                snapshot.telemetry = TelemetryRecord::ZERO;
            }
        });
    }

    /// Return the whole store to its initial state.
    pub fn reset(&self) {
        self.end_session();
        self.tx.send_replace(Snapshot::default());
    }
}
