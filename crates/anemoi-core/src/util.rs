//! Peripheral identity helpers for the btleplug backend.

use btleplug::platform::PeripheralId;

/// The address btleplug reports when the platform hides the real one.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_debug_wrapper(&format!("{:?}", id))
}

fn strip_debug_wrapper(debug: &str) -> String {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address_is_hidden(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn address_is_hidden(address: &str) -> bool {
    address == HIDDEN_ADDRESS
}
