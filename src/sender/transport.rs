//! Transport collaborator consumed by the sender.

/// Byte-stream sink for encoded frames.
///
/// When a frame is split into header and payload, the sender writes both
/// inside a [`cork`](Transport::cork)/[`uncork`](Transport::uncork) pair
/// with nothing interleaved from another frame.
pub trait Transport: Send {
    /// Hand bytes to the transport. Returns `false` when the transport's
    /// own buffer is above its high-water mark (advisory backpressure).
    fn write(&mut self, data: &[u8]) -> bool;

    /// Begin batching writes. Default no-op for transports without a
    /// grouped-write primitive.
    fn cork(&mut self) {}

    /// Flush a batch started by [`cork`](Transport::cork).
    fn uncork(&mut self) {}

    /// Whether the underlying socket is gone. Polled before acting on
    /// asynchronous completions.
    fn is_destroyed(&self) -> bool;
}
