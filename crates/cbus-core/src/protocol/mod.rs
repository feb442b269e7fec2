//! Protocol module containing the opcode catalog, the event model, and the ASCII codec.

pub mod codec;
pub mod event;
pub mod opcode;

pub use codec::{decode_frame, dump, encode_frame, FramingError, MIN_FRAME_LEN};
pub use event::{Event, MajorPriority, MinorPriority, NumberBase, MAX_PAYLOAD};
pub use opcode::{catalog_self_test, Opc, Opcode, Param, ParamKind};
