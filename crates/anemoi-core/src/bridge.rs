//! WebSocket telemetry bridge.
//!
//! A gateway on the local network pushes JSON frames such as
//! `{"cellVoltage":"10.41","ppO2":"0.21"}` over a WebSocket. [`BridgeClient`]
//! opens one connection, turns every frame into one point per configured
//! chart and exposes both the charts and the socket state through `watch`
//! channels. It never sends anything and never reconnects.

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use anemoi_types::{ParseError, ParseResult};

use crate::error::{Error, Result};
use crate::series::{SeriesBuffer, TimeSeriesPoint};

/// Gateway endpoint used when none is configured.
pub const DEFAULT_BRIDGE_URL: &str = "ws://192.168.1.154/ws";

/// Sensor cell voltage (mV).
pub const CELL_VOLTAGE: &str = "cellVoltage";
/// Oxygen partial pressure (bar).
pub const PP_O2: &str = "ppO2";
/// Temperature (°C).
pub const TEMPERATURE: &str = "temperature";
/// Atmospheric pressure. The gateway spells the key this way.
pub const ATMOSPHERIC_PRESSURE: &str = "athmosphericPressure";
/// Altitude (m).
pub const ALTITUDE: &str = "altitude";

/// Charts shown by default, in display order.
pub const DEFAULT_CHARTS: [&str; 5] = [CELL_VOLTAGE, PP_O2, TEMPERATURE, ATMOSPHERIC_PRESSURE, ALTITUDE];

/// One decoded bridge frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BridgeFrame {
    fields: Map<String, Value>,
}

impl BridgeFrame {
    /// Parse a text frame. Anything other than a JSON object is an error.
    pub fn parse(text: &str) -> ParseResult<Self> {
        match serde_json::from_str(text) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(ParseError::InvalidDocument(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(ParseError::InvalidDocument(e.to_string())),
        }
    }

    /// Numeric value of `key`.
    ///
    /// Numbers and numeric strings are accepted; anything else, including a
    /// missing key, yields `NaN`.
    pub fn value(&self, key: &str) -> f64 {
        match self.fields.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
}

/// What to do with a frame that is not a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedFramePolicy {
    /// Append a `NaN` point to every chart.
    #[default]
    RecordNaN,
    /// Ignore the frame.
    Discard,
}

/// One [`SeriesBuffer`] per chart key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSet {
    charts: Vec<(String, SeriesBuffer)>,
}

impl Default for ChartSet {
    fn default() -> Self {
        Self::new(DEFAULT_CHARTS)
    }
}

impl ChartSet {
    /// Create empty charts for `keys`, in order. Duplicate keys are ignored.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut charts: Vec<(String, SeriesBuffer)> = Vec::new();
        for key in keys {
            let key = key.into();
            if !charts.iter().any(|(k, _)| *k == key) {
                charts.push((key, SeriesBuffer::new()));
            }
        }
        Self { charts }
    }

    /// The buffer for `key`.
    pub fn get(&self, key: &str) -> Option<&SeriesBuffer> {
        self.charts.iter().find(|(k, _)| k == key).map(|(_, b)| b)
    }

    /// Chart keys with their buffers, in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SeriesBuffer)> {
        self.charts.iter().map(|(k, b)| (k.as_str(), b))
    }

    /// Append one point per chart from a text frame received at `now`.
    ///
    /// Returns `false` if the frame was discarded.
    pub fn ingest(&mut self, text: &str, now: OffsetDateTime, policy: MalformedFramePolicy) -> bool {
        let frame = match BridgeFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => match policy {
                MalformedFramePolicy::RecordNaN => {
                    warn!(error = %e, "Malformed bridge frame, recording NaN");
                    BridgeFrame::default()
                }
                MalformedFramePolicy::Discard => {
                    warn!(error = %e, "Malformed bridge frame, discarding");
                    return false;
                }
            },
        };

        for (key, buffer) in &mut self.charts {
            buffer.push(TimeSeriesPoint {
                timestamp: now,
                value: frame.value(key),
            });
        }
        true
    }
}

/// WebSocket state as reported to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// [`BridgeClient::run`] has not been called.
    #[default]
    Uninstantiated,
    /// Opening the socket.
    Connecting,
    /// Receiving frames.
    Open,
    /// Close handshake in progress.
    Closing,
    /// The socket has ended and no more frames arrive.
    Closed,
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReadyState::Uninstantiated => "Uninstantiated",
            ReadyState::Connecting => "Connecting",
            ReadyState::Open => "Open",
            ReadyState::Closing => "Closing",
            ReadyState::Closed => "Closed",
        };
        write!(f, "{label}")
    }
}

/// Bridge client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Gateway endpoint.
    pub url: String,
    /// Frame keys to chart.
    pub charts: Vec<String>,
    /// Handling of frames that are not JSON objects.
    pub malformed_frames: MalformedFramePolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BRIDGE_URL.to_string(),
            charts: DEFAULT_CHARTS.iter().map(|k| k.to_string()).collect(),
            malformed_frames: MalformedFramePolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Set the gateway endpoint.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the chart keys.
    #[must_use]
    pub fn charts<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.charts = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the malformed frame policy.
    #[must_use]
    pub fn malformed_frames(mut self, policy: MalformedFramePolicy) -> Self {
        self.malformed_frames = policy;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(Error::invalid_config(format!(
                "bridge url must use ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.charts.is_empty() {
            return Err(Error::invalid_config("at least one chart key is required"));
        }
        Ok(())
    }
}

/// Receives gateway frames and keeps the charts up to date.
#[derive(Debug)]
pub struct BridgeClient {
    config: BridgeConfig,
    ready: watch::Sender<ReadyState>,
    charts: watch::Sender<ChartSet>,
}

impl BridgeClient {
    /// Create a client. Nothing is opened until [`run`](Self::run).
    pub fn new(config: BridgeConfig) -> Self {
        let charts = ChartSet::new(config.charts.iter().cloned());
        Self {
            config,
            ready: watch::Sender::new(ReadyState::Uninstantiated),
            charts: watch::Sender::new(charts),
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Subscribe to socket state changes.
    pub fn ready_state(&self) -> watch::Receiver<ReadyState> {
        self.ready.subscribe()
    }

    /// Subscribe to chart updates.
    pub fn charts(&self) -> watch::Receiver<ChartSet> {
        self.charts.subscribe()
    }

    /// Feed one text frame received now into the charts.
    pub fn ingest(&self, text: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let policy = self.config.malformed_frames;
        self.charts
            .send_if_modified(|charts| charts.ingest(text, now, policy))
    }

    /// Open the socket and ingest frames until it closes or `cancel` fires.
    ///
    /// The ready state ends at [`ReadyState::Closed`] whatever the outcome.
    #[tracing::instrument(level = "info", skip_all, fields(url = %self.config.url))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.ready.send_replace(ReadyState::Connecting);

        let socket = tokio::select! {
            _ = cancel.cancelled() => {
                self.ready.send_replace(ReadyState::Closed);
                return Ok(());
            }
            result = connect_async(self.config.url.as_str()) => result,
        };
        let (socket, _response) = match socket {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Bridge connection failed");
                self.ready.send_replace(ReadyState::Closed);
                return Err(e.into());
            }
        };

        self.ready.send_replace(ReadyState::Open);
        info!("Bridge open");

        let (mut sink, mut stream) = socket.split();
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.ready.send_replace(ReadyState::Closing);
                    if let Err(e) = sink.close().await {
                        debug!(error = %e, "Close handshake failed");
                    }
                    break Ok(());
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.ingest(text.as_str());
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            self.ingest(text);
                        }
                        Err(e) => warn!(error = %e, "Ignoring non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Bridge closed by peer");
                        self.ready.send_replace(ReadyState::Closing);
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Bridge socket error");
                        break Err(Error::from(e));
                    }
                    None => break Ok(()),
                }
            }
        };

        self.ready.send_replace(ReadyState::Closed);
        info!("Bridge closed");
        result
    }
}
