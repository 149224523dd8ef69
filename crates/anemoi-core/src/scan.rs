//! Analyzer discovery.
//!
//! Analyzers are recognised by their advertised name alone; the scan runs
//! without a service filter because the firmware does not advertise its
//! service UUID.

use std::time::Duration;

use anemoi_types::PeripheralHandle;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::{BleCentral, Discovery};

/// Whether an advertised name contains `marker` (case-sensitive).
pub fn matches_name(handle: &PeripheralHandle, marker: &str) -> bool {
    handle.name.as_deref().is_some_and(|name| name.contains(marker))
}

/// Options for a one-shot scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Substring an advertised name must contain. `None` lists everything.
    pub name_marker: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            name_marker: Some(anemoi_types::ble::DEVICE_NAME_MARKER.to_string()),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// List every peripheral, not just analyzers.
    #[must_use]
    pub fn all_devices(mut self) -> Self {
        self.name_marker = None;
        self
    }
}

/// Scan for a fixed duration and return the distinct peripherals seen.
///
/// Results keep discovery order. A later sighting of a known peripheral
/// refreshes its RSSI and fills in a name it lacked. Scan errors are logged
/// and skipped.
pub async fn scan_with_options<C: BleCentral>(
    central: &C,
    options: &ScanOptions,
) -> Result<Vec<Discovery>> {
    let mut stream = central.start_scan().await?;
    let deadline = Instant::now() + options.duration;
    let mut found: Vec<Discovery> = Vec::new();

    loop {
        let next = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(next)) => next,
            Ok(None) | Err(_) => break,
        };
        let discovery = match next {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(error = %e, "Scan error");
                continue;
            }
        };

        if let Some(existing) = found.iter_mut().find(|d| d.handle == discovery.handle) {
            if discovery.rssi.is_some() {
                existing.rssi = discovery.rssi;
            }
            if existing.handle.name.is_none() {
                existing.handle.name = discovery.handle.name;
            }
        } else {
            debug!(device = %discovery.handle, "Found peripheral");
            found.push(discovery);
        }
    }

    if let Err(e) = central.stop_scan().await {
        warn!(error = %e, "Failed to stop scan");
    }

    if let Some(marker) = &options.name_marker {
        found.retain(|d| matches_name(&d.handle, marker));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCentral;

    #[test]
    fn test_matches_name() {
        let h = |name: Option<&str>| PeripheralHandle::new("id", name.map(String::from));
        assert!(matches_name(&h(Some("Anemoi Analyzer Nano")), "Anemoi"));
        assert!(!matches_name(&h(Some("ANEMOI")), "Anemoi"));
        assert!(!matches_name(&h(None), "Anemoi"));
        assert!(matches_name(&h(Some("Sensor X")), "Sensor"));
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new().duration_secs(3).all_devices();
        assert_eq!(options.duration, Duration::from_secs(3));
        assert!(options.name_marker.is_none());
        assert_eq!(ScanOptions::default().name_marker.as_deref(), Some("Anemoi"));
    }

    #[tokio::test]
    async fn test_scan_collects_distinct_analyzers() {
        let central = MockCentral::new();
        central.discover(PeripheralHandle::new("A", Some("Anemoi Analyzer Nano".into()))).await;
        central.discover(PeripheralHandle::new("B", Some("Phone".into()))).await;
        central.discover(PeripheralHandle::new("A", Some("Anemoi Analyzer Nano".into()))).await;
        central.discover(PeripheralHandle::new("C", None)).await;

        let options = ScanOptions::new().duration(Duration::from_millis(50));
        let found = scan_with_options(&central, &options).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].handle.id, "A");
        assert!(!central.is_scanning());

        let found = scan_with_options(&central, &options.all_devices())
            .await
            .unwrap();
        assert!(found.is_empty(), "queued discoveries are consumed by the first scan");
    }
}
