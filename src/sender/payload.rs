//! Outbound message payload variants.
//!
//! The payload kind is decided at the API boundary with an explicit tagged
//! type rather than by probing the value's shape at runtime.

use bytes::Bytes;

use crate::error::Result;

/// Completion callback for an asynchronous payload read. Invoked exactly
/// once with the full payload bytes or an error.
pub type ReadDone = Box<dyn FnOnce(Result<Vec<u8>>) + Send>;

/// A payload that must be materialized asynchronously before framing,
/// such as a file- or blob-backed body.
pub trait PayloadSource: Send {
    /// Payload size in bytes, readable synchronously before the read
    /// completes. Used for backpressure accounting.
    fn byte_length(&self) -> usize;

    /// Read the full payload, completing through `done`.
    fn read(self: Box<Self>, done: ReadDone);
}

/// One outbound message payload.
pub enum Payload {
    /// UTF-8 text, sent with the text opcode.
    Text(String),
    /// Owned binary data; maskable in place.
    Binary(Vec<u8>),
    /// Shared read-only bytes; masking copies into a fresh buffer.
    Shared(Bytes),
    /// Asynchronously materialized data.
    Source(Box<dyn PayloadSource>),
}

impl Payload {
    /// Payload size in bytes, known synchronously for every variant.
    #[must_use]
    pub fn byte_length(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(data) => data.len(),
            Payload::Shared(data) => data.len(),
            Payload::Source(source) => source.byte_length(),
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Payload::Binary(data) => f.debug_tuple("Binary").field(&data.len()).finish(),
            Payload::Shared(data) => f.debug_tuple("Shared").field(&data.len()).finish(),
            Payload::Source(source) => {
                f.debug_tuple("Source").field(&source.byte_length()).finish()
            }
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(data)
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Shared(data)
    }
}

impl From<Box<dyn PayloadSource>> for Payload {
    fn from(source: Box<dyn PayloadSource>) -> Self {
        Payload::Source(source)
    }
}
