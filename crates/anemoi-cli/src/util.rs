//! Utility functions for CLI operations.

use std::sync::Arc;
use std::time::Duration;

use anemoi_core::{BleCentral, ConnectionManager, ManagerConfig, PeripheralHandle, TelemetryStore};
use anyhow::{Context, Result, anyhow};

use crate::cli::{DEFAULT_CONNECT_TIMEOUT, DeviceArgs};
use crate::config::{Config, resolve_protocol, resolve_timeout};

/// How long to wait for the device, from flags and config.
pub fn connect_timeout(args: &DeviceArgs, config: &Config) -> Duration {
    Duration::from_secs(resolve_timeout(args.timeout, config, DEFAULT_CONNECT_TIMEOUT))
}

/// Manager settings for a command that connects to one analyzer.
pub fn manager_config(args: &DeviceArgs, config: &Config) -> ManagerConfig {
    ManagerConfig::new()
        .decoder(resolve_protocol(args.protocol, config).into())
        .connection_timeout(connect_timeout(args, config))
}

/// Whether `handle` is the device the user asked for.
///
/// Identities compare case-insensitively so MAC addresses can be typed in
/// either case; names must match exactly.
pub fn matches_identifier(handle: &PeripheralHandle, identifier: &str) -> bool {
    handle.id.eq_ignore_ascii_case(identifier) || handle.name.as_deref() == Some(identifier)
}

/// Pick the requested device from the discovered list, or the first one.
pub fn select_device<'a>(
    devices: &'a [PeripheralHandle],
    identifier: Option<&str>,
) -> Option<&'a PeripheralHandle> {
    match identifier {
        Some(id) => devices.iter().find(|d| matches_identifier(d, id)),
        None => devices.first(),
    }
}

/// Scan through `manager` until the requested analyzer shows up.
///
/// The scan keeps running on return; connecting stops it.
pub async fn find_device<C: BleCentral>(
    manager: &ConnectionManager<C>,
    identifier: Option<&str>,
    timeout: Duration,
) -> Result<PeripheralHandle> {
    manager
        .start_scan()
        .await
        .context("Failed to start scanning")?;

    let mut rx = manager.store().subscribe();
    let found = tokio::time::timeout(
        timeout,
        rx.wait_for(|s| select_device(&s.devices, identifier).is_some()),
    )
    .await
    .map(|r| r.map(|s| select_device(&s.devices, identifier).cloned()));

    match found {
        Ok(Ok(handle)) => handle.ok_or_else(|| anyhow!("Device disappeared from scan results")),
        Ok(Err(_)) => Err(anyhow!("Telemetry store closed while scanning")),
        Err(_) => {
            manager.stop_scan().await;
            Err(match identifier {
                Some(id) => anyhow!(
                    "Device '{}' not found after {}s.\n\
                     Make sure the analyzer is powered on and in range, or run 'anemoi scan'.",
                    id,
                    timeout.as_secs()
                ),
                None => anyhow!(
                    "No Anemoi analyzers found after {}s.\n\
                     Make sure the analyzer is powered on and in range.",
                    timeout.as_secs()
                ),
            })
        }
    }
}

/// Find the requested analyzer and connect to it.
pub async fn connect_analyzer<C: BleCentral>(
    central: C,
    identifier: Option<&str>,
    timeout: Duration,
    config: ManagerConfig,
) -> Result<(ConnectionManager<C>, PeripheralHandle)> {
    let manager = ConnectionManager::with_config(central, Arc::new(TelemetryStore::new()), config)
        .context("Invalid connection settings")?;
    let handle = find_device(&manager, identifier, timeout).await?;
    manager
        .connect(&handle)
        .await
        .with_context(|| format!("Failed to connect to {}", handle))?;
    Ok((manager, handle))
}
