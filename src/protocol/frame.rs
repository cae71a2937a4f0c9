//! Outbound frame serialization (RFC 6455 Section 5.2).
//!
//! [`frame`] turns a payload and a set of framing options into wire-exact
//! bytes:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (if MASK set)                     |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::Bytes;

use crate::protocol::OpCode;
use crate::protocol::mask::{MaskKeySource, apply_mask};

/// Maximum payload size for control frames (RFC 6455 Section 5.5).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Payloads at or below this size are merged into one buffer with the
/// header; larger payloads stay split to avoid the copy.
const MERGE_PAYLOAD_MAX: usize = 1024;

/// Payload handed to the encoder.
///
/// `ReadOnly` data is never mutated: when masking applies, the transform
/// writes into a fresh buffer instead.
#[derive(Debug, Clone)]
pub enum FrameData {
    /// Exclusively owned bytes; masking happens in place.
    Owned(Vec<u8>),
    /// Shared bytes that must not be modified.
    ReadOnly(Bytes),
}

impl FrameData {
    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            FrameData::Owned(data) => data.len(),
            FrameData::ReadOnly(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            FrameData::Owned(data) => data,
            FrameData::ReadOnly(data) => data,
        }
    }

    /// Extract owned bytes, copying only for the read-only variant.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            FrameData::Owned(data) => data,
            FrameData::ReadOnly(data) => data.to_vec(),
        }
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Owned(data)
    }
}

impl From<String> for FrameData {
    fn from(data: String) -> Self {
        FrameData::Owned(data.into_bytes())
    }
}

impl From<Bytes> for FrameData {
    fn from(data: Bytes) -> Self {
        FrameData::ReadOnly(data)
    }
}

/// Options controlling the layout of one outbound frame.
pub struct FrameOptions<'a> {
    /// Set the FIN bit.
    pub fin: bool,
    /// Set the RSV1 bit (compressed-frame marker).
    pub rsv1: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Mask the payload, drawing the key from this source. `None` sends the
    /// frame unmasked (server role).
    pub mask: Option<&'a mut MaskKeySource>,
}

/// A serialized frame, ready to hand to the transport.
///
/// Both forms represent one logical frame; the consumer must write a split
/// frame's header and payload back-to-back with nothing interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    /// Header and payload merged into one buffer.
    Single(Vec<u8>),
    /// Header separate from a large payload, skipping the merge copy.
    Split {
        /// Frame header, including any mask key.
        header: Vec<u8>,
        /// Payload bytes, masked if the header says so.
        payload: Bytes,
    },
}

impl EncodedFrame {
    /// Total number of bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        match self {
            EncodedFrame::Single(buf) => buf.len(),
            EncodedFrame::Split { header, payload } => header.len() + payload.len(),
        }
    }

    /// Concatenate into a single buffer. Intended for tests and callers
    /// that do not support grouped writes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            EncodedFrame::Single(buf) => buf,
            EncodedFrame::Split { mut header, payload } => {
                header.extend_from_slice(&payload);
                header
            }
        }
    }
}

/// Serialize one frame.
///
/// Masking, when enabled, XORs byte `i` of the payload against
/// `key[i % 4]`. A pool-drawn all-zero key skips the transform (a no-op)
/// while still setting the MASK bit and writing the key bytes.
pub fn frame(data: FrameData, options: FrameOptions<'_>) -> EncodedFrame {
    let payload_len = data.len();
    let mask = options.mask.map(MaskKeySource::next_key);

    let mut header_len = 2;
    if payload_len >= 65536 {
        header_len += 8;
    } else if payload_len > MAX_CONTROL_FRAME_PAYLOAD {
        header_len += 2;
    }
    if mask.is_some() {
        header_len += 4;
    }

    let merge = payload_len <= MERGE_PAYLOAD_MAX;
    let mut header = Vec::with_capacity(if merge {
        header_len + payload_len
    } else {
        header_len
    });

    let mut byte0 = options.opcode.as_u8();
    if options.fin {
        byte0 |= 0x80;
    }
    if options.rsv1 {
        byte0 |= 0x40;
    }
    header.push(byte0);

    let mut byte1 = if payload_len >= 65536 {
        127
    } else if payload_len > MAX_CONTROL_FRAME_PAYLOAD {
        126
    } else {
        payload_len as u8
    };
    if mask.is_some() {
        byte1 |= 0x80;
    }
    header.push(byte1);

    if payload_len >= 65536 {
        header.extend_from_slice(&(payload_len as u64).to_be_bytes());
    } else if payload_len > MAX_CONTROL_FRAME_PAYLOAD {
        header.extend_from_slice(&(payload_len as u16).to_be_bytes());
    }

    if let Some(drawn) = mask {
        header.extend_from_slice(&drawn.key);
    }

    let transform = mask.filter(|drawn| !drawn.skip_masking);

    if merge {
        header.extend_from_slice(data.as_slice());
        if let Some(drawn) = transform {
            apply_mask(&mut header[header_len..], drawn.key);
        }
        return EncodedFrame::Single(header);
    }

    let payload = match (transform, data) {
        (Some(drawn), FrameData::Owned(mut buf)) => {
            apply_mask(&mut buf, drawn.key);
            Bytes::from(buf)
        }
        (Some(drawn), FrameData::ReadOnly(shared)) => {
            let mut buf = shared.to_vec();
            apply_mask(&mut buf, drawn.key);
            Bytes::from(buf)
        }
        (None, FrameData::Owned(buf)) => Bytes::from(buf),
        (None, FrameData::ReadOnly(shared)) => shared,
    };

    EncodedFrame::Split { header, payload }
}
