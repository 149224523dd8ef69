//! Scan and connection management for a single analyzer.
//!
//! [`ConnectionManager`] drives a [`BleCentral`] through the analyzer
//! lifecycle and writes every outcome into a [`TelemetryStore`]:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                      \-> Disconnected (on failure)
//! ```
//!
//! At most one analyzer is connected at a time. While connected, every
//! subscription is forwarded into one channel that a single pump task drains,
//! so record updates are applied one at a time in delivery order.

use std::sync::Arc;
use std::time::Duration;

use anemoi_types::PeripheralHandle;
use anemoi_types::ble::{self, DEVICE_NAME_MARKER};
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, encode_command};
use crate::decoder::{TelemetryDecoder, ValueEncoding};
use crate::error::{ConnectStage, Error, Result};
use crate::scan::matches_name;
use crate::store::{ConnectionState, DisconnectPolicy, LateUpdatePolicy, TelemetryStore};
use crate::transport::{BleCentral, BleLink, DiscoveryStream, Notification, NotificationStream};

/// Default timeout for establishing the BLE link.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the calibrate write.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`ConnectionManager`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use anemoi_core::{DisconnectPolicy, ManagerConfig, TelemetryDecoder};
///
/// let config = ManagerConfig::default()
///     .decoder(TelemetryDecoder::Composite)
///     .disconnect_policy(DisconnectPolicy::KeepLastKnown)
///     .connection_timeout(Duration::from_secs(20));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Which firmware payload format to decode.
    pub decoder: TelemetryDecoder,
    /// Override for the link's value encoding.
    pub value_encoding: Option<ValueEncoding>,
    /// What happens to the record when the connection ends.
    pub disconnect_policy: DisconnectPolicy,
    /// What happens to updates that arrive after the connection ended.
    pub late_update_policy: LateUpdatePolicy,
    /// Timeout for establishing the BLE link.
    pub connection_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
    /// Timeout for command writes.
    pub write_timeout: Duration,
    /// Substring an advertised name must contain to be listed.
    pub name_marker: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            decoder: TelemetryDecoder::default(),
            value_encoding: None,
            disconnect_policy: DisconnectPolicy::default(),
            late_update_policy: LateUpdatePolicy::default(),
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            name_marker: DEVICE_NAME_MARKER.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decoder.
    #[must_use]
    pub fn decoder(mut self, decoder: TelemetryDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Force a value encoding instead of the one the link reports.
    #[must_use]
    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = Some(encoding);
        self
    }

    /// Set the disconnect policy.
    #[must_use]
    pub fn disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    /// Set the late update policy.
    #[must_use]
    pub fn late_update_policy(mut self, policy: LateUpdatePolicy) -> Self {
        self.late_update_policy = policy;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the advertised name marker.
    #[must_use]
    pub fn name_marker(mut self, marker: impl Into<String>) -> Self {
        self.name_marker = marker.into();
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connection_timeout", self.connection_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be non-zero")));
            }
        }
        if self.name_marker.is_empty() {
            return Err(Error::invalid_config("name_marker must not be empty"));
        }
        Ok(())
    }
}

/// The connected analyzer and the tasks feeding its telemetry.
struct ActiveLink<L> {
    link: Arc<L>,
    session: u64,
    cancel: CancellationToken,
}

/// A running scan.
struct ScanTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type ActiveSlot<L> = Arc<Mutex<Option<ActiveLink<L>>>>;

/// Discovers analyzers and manages the single active connection.
pub struct ConnectionManager<C: BleCentral> {
    central: Arc<C>,
    store: Arc<TelemetryStore>,
    config: ManagerConfig,
    scan: Mutex<Option<ScanTask>>,
    active: ActiveSlot<C::Link>,
}

impl<C: BleCentral> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("connection", &self.store.connection())
            .finish_non_exhaustive()
    }
}

impl<C: BleCentral> ConnectionManager<C> {
    /// Create a manager with default configuration.
    pub fn new(central: C, store: Arc<TelemetryStore>) -> Self {
        Self {
            central: Arc::new(central),
            store,
            config: ManagerConfig::default(),
            scan: Mutex::new(None),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a manager with a custom configuration.
    pub fn with_config(
        central: C,
        store: Arc<TelemetryStore>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(central, store)
        })
    }

    /// The store this manager writes to.
    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    /// The manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The underlying BLE central.
    pub fn central(&self) -> &C {
        &self.central
    }

    /// Whether a scan is running.
    pub async fn is_scanning(&self) -> bool {
        self.scan
            .lock()
            .await
            .as_ref()
            .is_some_and(|scan| !scan.task.is_finished())
    }

    /// Begin continuous discovery.
    ///
    /// Every peripheral whose advertised name contains the configured marker
    /// is appended to the store's device list once. Errors reported by the
    /// scan are logged and the scan keeps going. Calling this while a scan
    /// is running does nothing.
    pub async fn start_scan(&self) -> Result<()> {
        let mut scan = self.scan.lock().await;
        if scan.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("Scan already running");
            return Ok(());
        }

        let stream = self.central.start_scan().await.inspect_err(|e| {
            warn!(error = %e, "Failed to start scan");
        })?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_scan(
            stream,
            Arc::clone(&self.store),
            self.config.name_marker.clone(),
            cancel.clone(),
        ));
        *scan = Some(ScanTask { cancel, task });
        info!("Scanning for analyzers");
        Ok(())
    }

    /// Stop a running scan. Stopping when idle does nothing.
    pub async fn stop_scan(&self) {
        let Some(scan) = self.scan.lock().await.take() else {
            return;
        };
        scan.cancel.cancel();
        if let Err(e) = self.central.stop_scan().await {
            warn!(error = %e, "Failed to stop scan");
        }
        debug!("Scan stopped");
    }

    /// Forget every discovered analyzer.
    pub fn reset_devices(&self) {
        self.store.reset_devices();
    }

    /// Whether an analyzer is connected.
    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Connect to an analyzer and start receiving telemetry.
    ///
    /// Any analyzer already connected is disconnected first. On failure the
    /// link is dropped, the state returns to [`ConnectionState::Disconnected`]
    /// and the error names the stage that failed. Nothing is retried.
    #[tracing::instrument(level = "info", skip_all, fields(device = %handle))]
    pub async fn connect(&self, handle: &PeripheralHandle) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(previous = %previous.link.handle(), "Disconnecting previous analyzer");
            release_link(&self.store, previous, self.config.disconnect_policy).await;
        }

        self.store
            .set_connection(ConnectionState::Connecting(handle.clone()));

        match self.establish(handle).await {
            Ok(link) => {
                *active = Some(link);
                self.store
                    .set_connection(ConnectionState::Connected(handle.clone()));
                info!("Connected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connection failed");
                self.store.set_connection(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self, handle: &PeripheralHandle) -> Result<ActiveLink<C::Link>> {
        let config = &self.config;

        debug!("Connecting...");
        let link = timeout(config.connection_timeout, self.central.connect(handle))
            .await
            .map_err(|_| Error::timeout("connect to analyzer", config.connection_timeout))
            .and_then(|r| r)
            .map_err(|e| Error::connection_failed(ConnectStage::Connect, e.to_string()))?;
        let link = Arc::new(link);

        debug!("Discovering services...");
        let discovered = timeout(config.discovery_timeout, link.discover())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))
            .and_then(|r| r);
        if let Err(e) = discovered {
            drop_link(&*link).await;
            return Err(Error::connection_failed(
                ConnectStage::Discover,
                e.to_string(),
            ));
        }

        self.stop_scan().await;

        let session = self.store.begin_session();
        let mut streams = Vec::new();
        for characteristic in config.decoder.subscriptions() {
            match link.subscribe(characteristic).await {
                Ok(stream) => streams.push(stream),
                Err(e) => {
                    self.store.end_session();
                    drop_link(&*link).await;
                    return Err(Error::connection_failed(
                        ConnectStage::Subscribe,
                        format!("{characteristic}: {e}"),
                    ));
                }
            }
        }
        debug!(subscriptions = streams.len(), "Subscribed to telemetry");

        let encoding = config
            .value_encoding
            .unwrap_or_else(|| link.value_encoding());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        for stream in streams {
            tokio::spawn(forward_notifications(stream, tx.clone(), cancel.clone()));
        }
        drop(tx);

        tokio::spawn(pump(
            rx,
            PumpContext {
                store: Arc::clone(&self.store),
                active: Arc::clone(&self.active),
                session,
                decoder: config.decoder,
                encoding,
                late_update_policy: config.late_update_policy,
                disconnect_policy: config.disconnect_policy,
            },
        ));

        Ok(ActiveLink {
            link,
            session,
            cancel,
        })
    }

    /// Disconnect the active analyzer.
    ///
    /// A platform report that the link is already gone is tolerated. The
    /// connection state is cleared either way, and the record is zeroed or
    /// kept according to the [`DisconnectPolicy`]. Calling this when nothing
    /// is connected does nothing.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        let Some(link) = active.take() else {
            debug!("No analyzer connected");
            return;
        };
        release_link(&self.store, link, self.config.disconnect_policy).await;
        info!("Disconnected");
    }

    /// Ask the connected analyzer to calibrate its sensors.
    ///
    /// Without a connected analyzer this logs and returns `Ok(())`. A failed
    /// write is logged and returned; it is never retried.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn send_calibrate(&self) -> Result<()> {
        let link = match self.active.lock().await.as_ref() {
            Some(active) => Arc::clone(&active.link),
            None => {
                info!("No analyzer connected, calibration not sent");
                return Ok(());
            }
        };

        let encoding = self
            .config
            .value_encoding
            .unwrap_or_else(|| link.value_encoding());
        let value = encode_command(commands::CALIBRATE, encoding);
        let write_timeout = self.config.write_timeout;

        let result = timeout(
            write_timeout,
            link.write_with_response(ble::CALIBRATE, &value),
        )
        .await
        .map_err(|_| Error::timeout("write calibrate command", write_timeout))
        .and_then(|r| r);

        match result {
            Ok(()) => {
                info!("Calibration command sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Calibration command failed");
                Err(e)
            }
        }
    }
}

/// Cancel a link's telemetry, disconnect it and clear the connection state.
async fn release_link<L: BleLink>(
    store: &TelemetryStore,
    active: ActiveLink<L>,
    policy: DisconnectPolicy,
) {
    active.cancel.cancel();
    drop_link(&*active.link).await;
    store.end_session();
    store.finish_connection(policy);
}

async fn drop_link<L: BleLink>(link: &L) {
    match link.disconnect().await {
        Ok(()) => {}
        Err(Error::NotConnected) => debug!("Analyzer already disconnected"),
        Err(e) => warn!(error = %e, "Disconnect failed, dropping link"),
    }
}

async fn run_scan(
    mut stream: DiscoveryStream,
    store: Arc<TelemetryStore>,
    marker: String,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(discovery)) => {
                    if matches_name(&discovery.handle, &marker) {
                        store.add_device(discovery.handle);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Scan error"),
                None => {
                    debug!("Scan stream ended");
                    break;
                }
            }
        }
    }
}

async fn forward_notifications(
    mut stream: NotificationStream,
    tx: mpsc::UnboundedSender<Notification>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(notification) => {
                    if tx.send(notification).is_err() {
                        break;
                    }
                }
                None => {
                    // One subscription ending means the link is gone; stop the rest.
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}

struct PumpContext<L> {
    store: Arc<TelemetryStore>,
    active: ActiveSlot<L>,
    session: u64,
    decoder: TelemetryDecoder,
    encoding: ValueEncoding,
    late_update_policy: LateUpdatePolicy,
    disconnect_policy: DisconnectPolicy,
}

impl<L> PumpContext<L> {
    fn handle(&self, notification: &Notification) {
        if let Some(update) = self.decoder.decode(notification, self.encoding) {
            self.store
                .apply_update(&update, self.session, self.late_update_policy);
        }
    }
}

/// Apply every forwarded notification, then clean up if the link was lost.
async fn pump<L: BleLink>(mut rx: mpsc::UnboundedReceiver<Notification>, ctx: PumpContext<L>) {
    while let Some(notification) = rx.recv().await {
        ctx.handle(&notification);
    }

    // All forwarders are gone. If this session is still the active one,
    // nobody asked for it to end.
    let mut active = ctx.active.lock().await;
    if active.as_ref().is_some_and(|a| a.session == ctx.session)
        && let Some(lost) = active.take()
    {
        warn!(device = %lost.link.handle(), "Connection to analyzer lost");
        release_link(&ctx.store, lost, ctx.disconnect_policy).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemoi_types::TelemetryChannel;

    use crate::mock::MockPeripheral;

    fn context(policy: LateUpdatePolicy, store: Arc<TelemetryStore>) -> PumpContext<MockPeripheral> {
        PumpContext {
            store,
            active: Arc::new(Mutex::new(None)),
            session: 1,
            decoder: TelemetryDecoder::PerChannel,
            encoding: ValueEncoding::Utf8,
            late_update_policy: policy,
            disconnect_policy: DisconnectPolicy::ResetTelemetry,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.decoder, TelemetryDecoder::PerChannel);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::ResetTelemetry);
        assert_eq!(config.late_update_policy, LateUpdatePolicy::Apply);
        assert_eq!(config.connection_timeout, Duration::from_secs(15));
        assert_eq!(config.name_marker, "Anemoi");
        assert!(config.value_encoding.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ManagerConfig::new().write_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = ManagerConfig::new().name_marker("");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_late_update_after_session_end() {
        let store = Arc::new(TelemetryStore::new());
        let notification = Notification::new(ble::TEMPERATURE, "21.0");

        let drop_stale = context(LateUpdatePolicy::DropStale, Arc::clone(&store));
        assert_eq!(store.begin_session(), drop_stale.session);
        store.end_session();
        drop_stale.handle(&notification);
        assert_eq!(store.telemetry().temperature, 0.0);

        let apply = context(LateUpdatePolicy::Apply, Arc::clone(&store));
        apply.handle(&notification);
        assert_eq!(store.telemetry().get(TelemetryChannel::Temperature), 21.0);
    }
}
