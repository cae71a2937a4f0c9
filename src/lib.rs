//! # wsout - WebSocket Outbound Protocol Engine
//!
//! `wsout` implements the sending half of an RFC 6455 WebSocket endpoint:
//! frame serialization, the extension negotiation header grammar, payload
//! validation, and an ordered send pipeline with optional per-message
//! compression.
//!
//! ## Features
//!
//! - **RFC 6455 frame encoding** with all three length encodings and
//!   client-side masking from a pooled random source
//! - **Zero-copy large frames**: big unmasked payloads travel as shared
//!   bytes next to a separately written header
//! - **`Sec-WebSocket-Extensions` parsing and formatting** per the
//!   RFC 7230 token/quoted-string grammar
//! - **Ordered send pipeline**: submissions queue behind asynchronous
//!   compression and drain strictly FIFO
//! - **Backpressure accounting** via a buffered byte count
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsout::{Extensions, MaskKeySource, SendOptions, Sender};
//!
//! let sender = Sender::new(transport, Extensions::new(), MaskKeySource::random());
//! sender.send("hello", SendOptions { mask: true, ..SendOptions::default() }, None);
//! ```

pub mod error;
pub mod extensions;
pub mod protocol;
pub mod sender;

pub use error::{Error, Result};
pub use extensions::{
    CompressDone, Compressor, ExtensionOffers, Extensions, OfferParams, ParamValue,
    PERMESSAGE_DEFLATE,
};
pub use protocol::{
    EncodedFrame, FrameData, FrameOptions, MAX_CONTROL_FRAME_PAYLOAD, MaskKeySource, OpCode,
    apply_mask, frame, is_valid_close_code, is_valid_utf8,
};
pub use sender::{
    Payload, PayloadSource, ReadDone, SendCallback, SendOptions, Sender, SenderState, Transport,
};
