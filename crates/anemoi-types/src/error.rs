//! Error types for payload parsing in anemoi-types.

use thiserror::Error;

/// Errors that can occur when decoding Anemoi telemetry payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in anemoi-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The characteristic delivered no value.
    #[error("Empty payload")]
    EmptyPayload,

    /// Payload was not valid base64.
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    /// Payload was not valid UTF-8 text.
    #[error("Payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Text could not be parsed as a number.
    #[error("Invalid number '{text}'")]
    InvalidNumber {
        /// The trimmed text that failed to parse.
        text: String,
    },

    /// Text could not be parsed as a telemetry JSON document.
    #[error("Invalid telemetry document: {0}")]
    InvalidDocument(String),
}

/// Result type alias using anemoi-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
