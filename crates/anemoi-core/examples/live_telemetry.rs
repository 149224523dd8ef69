//! Example: Streaming Live Telemetry
//!
//! Connects to the first analyzer found (or the one named on the command
//! line) and prints every telemetry change until Ctrl+C.
//!
//! Run with: `cargo run --example live_telemetry -- [DEVICE_ID_OR_NAME] [--composite]`

use std::env;
use std::sync::Arc;

use anemoi_core::{
    BtleCentral, ConnectionManager, ManagerConfig, PeripheralHandle, TelemetryChannel, TelemetryDecoder,
    TelemetryStore,
};

fn is_wanted(handle: &PeripheralHandle, wanted: Option<&str>) -> bool {
    wanted.is_none_or(|w| handle.id == w || handle.name.as_deref() == Some(w))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let decoder = if args.iter().any(|a| a == "--composite") {
        TelemetryDecoder::Composite
    } else {
        TelemetryDecoder::PerChannel
    };
    let wanted = args.iter().find(|a| !a.starts_with("--")).cloned();

    let store = Arc::new(TelemetryStore::new());
    let manager = ConnectionManager::with_config(
        BtleCentral::new().await?,
        Arc::clone(&store),
        ManagerConfig::new().decoder(decoder),
    )?;

    println!("Scanning...");
    manager.start_scan().await?;
    let mut rx = store.subscribe();
    let handle = rx
        .wait_for(|s| s.devices.iter().any(|d| is_wanted(d, wanted.as_deref())))
        .await?
        .devices
        .iter()
        .find(|d| is_wanted(d, wanted.as_deref()))
        .cloned()
        .ok_or("analyzer disappeared")?;

    println!("Connecting to {}...", handle);
    manager.connect(&handle).await?;
    println!("Connected!");
    println!();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if !snapshot.connection.is_connected() {
                    println!("Connection lost.");
                    break;
                }
                for channel in TelemetryChannel::ALL {
                    print!("{}: {:.2}{}  ", channel, snapshot.telemetry.get(channel), channel.unit());
                }
                println!();
            }
        }
    }

    manager.disconnect().await;
    Ok(())
}
