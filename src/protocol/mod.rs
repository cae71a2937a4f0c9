//! Wire-level protocol pieces: opcodes, frame serialization, masking and
//! the pure validators.

pub mod frame;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use frame::{EncodedFrame, FrameData, FrameOptions, MAX_CONTROL_FRAME_PAYLOAD, frame};
pub use mask::{MaskKeySource, apply_mask};
pub use opcode::OpCode;
pub use validation::{is_valid_close_code, is_valid_utf8};
