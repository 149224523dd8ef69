//! Commands understood by the analyzer.
//!
//! The analyzer accepts a single command: the ASCII token `CAL`, written with
//! response to the [`CALIBRATE`](anemoi_types::ble::CALIBRATE) characteristic.

use crate::decoder::ValueEncoding;

/// Calibrate the sensors against ambient air.
pub const CALIBRATE: &[u8] = b"CAL";

/// Encode a command for the platform's value representation.
///
/// On base64 platforms `CAL` goes out as `Q0FM`; elsewhere the raw bytes are
/// written unchanged.
pub fn encode_command(command: &[u8], encoding: ValueEncoding) -> Vec<u8> {
    encoding.encode(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibrate_token() {
        assert_eq!(CALIBRATE, b"CAL");
        assert_eq!(encode_command(CALIBRATE, ValueEncoding::Base64), b"Q0FM");
        assert_eq!(encode_command(CALIBRATE, ValueEncoding::Utf8), b"CAL");
    }
}
