//! Error types for the outbound WebSocket protocol engine.
//!
//! Errors fall into three families with different delivery rules:
//! argument errors fail the offending call synchronously before any state
//! change, grammar errors reject an extension header as a whole, and
//! connection errors are reported asynchronously to every pending send
//! callback.

use thiserror::Error;

/// Result type alias for outbound WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while framing and sending WebSocket data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Close frame status code outside the ranges allowed by RFC 6455.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Control frame payload exceeds the 125 byte limit.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Close frame reason exceeds 123 bytes (2 byte code + reason <= 125).
    #[error("Close reason too large: {0} bytes (max: 123)")]
    CloseReasonTooLarge(usize),

    /// Malformed `Sec-WebSocket-Extensions` header value.
    #[error("Unexpected character in extension header at index {index}: {found:?}")]
    HeaderSyntax {
        /// Byte index of the offending character.
        index: usize,
        /// The offending character.
        found: char,
    },

    /// Extension header ended mid-parameter, mid-quote or mid-escape.
    #[error("Unexpected end of extension header")]
    TruncatedHeader,

    /// The transport was destroyed while an operation was pending.
    #[error("The socket was closed before the frame could be sent")]
    SocketClosed,

    /// The negotiated compressor reported a failure.
    #[error("Compression failed: {0}")]
    Compression(String),

    /// An asynchronous payload source failed to produce its bytes.
    #[error("Payload read failed: {0}")]
    PayloadRead(String),
}
