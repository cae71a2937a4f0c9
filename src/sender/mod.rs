//! Outbound send pipeline: payload types, the transport seam, and the
//! send state machine.

pub mod payload;
pub mod sender;
pub mod transport;

pub use payload::{Payload, PayloadSource, ReadDone};
pub use sender::{SendCallback, SendOptions, Sender, SenderState};
pub use transport::Transport;
