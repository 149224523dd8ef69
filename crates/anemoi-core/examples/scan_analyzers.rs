//! Example: Scanning for Anemoi Analyzers
//!
//! Lists every peripheral whose advertised name marks it as an analyzer.
//!
//! Run with: `cargo run --example scan_analyzers`

use anemoi_core::{BtleCentral, ScanOptions, scan_with_options};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Scanning for Anemoi analyzers...");
    println!();

    let central = BtleCentral::new().await?;
    let devices = scan_with_options(&central, &ScanOptions::new().duration_secs(10)).await?;

    if devices.is_empty() {
        println!("No analyzers found.");
        println!();
        println!("Make sure:");
        println!("  - The analyzer is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The analyzer is within range");
    } else {
        println!("Found {} analyzer(s):", devices.len());
        println!();

        for device in &devices {
            let rssi = device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string());

            println!("  {}", device.handle.display_name());
            println!("    Identifier: {}", device.handle.id);
            println!("    RSSI: {}", rssi);
            println!();
        }
    }

    Ok(())
}
