//! # cbus-core
//!
//! Shared library for the CBUS tooling containing the ASCII frame codec,
//! the opcode catalog, and the structured [`Event`] model.
//!
//! This crate is used by both the driver and the TCP gateway.
//! It has zero dependencies on sockets, serial ports, or the async runtime.
//!
//! # Architecture overview (for beginners)
//!
//! CBUS is a control protocol layered on top of a CAN network, mostly used for
//! model-railway layouts.  A USB or Ethernet interface module translates every
//! CAN frame into a short ASCII string such as `:S10A0N9000010002;` and back.
//!
//! This crate (`cbus-core`) is the shared foundation.  It defines:
//!
//! - **`protocol::opcode`** – The closed catalog of CBUS opcodes.  Each entry
//!   knows its byte value, its mnemonic (`ACON`, `QNN`, …) and the layout of
//!   its parameter bytes.
//!
//! - **`protocol::event`** – [`Event`]: priorities, CAN identifier, opcode and
//!   payload of one bus message.
//!
//! - **`protocol::codec`** – Pure functions that turn ASCII frames into events
//!   ([`decode_frame`]), events into frames ([`encode_frame`]) and events into
//!   human-readable log lines ([`dump`]).

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `cbus_core::Event` instead of `cbus_core::protocol::event::Event`.
pub use protocol::codec::{decode_frame, dump, encode_frame, FramingError};
pub use protocol::event::{Event, MajorPriority, MinorPriority, NumberBase};
pub use protocol::opcode::{Opc, Opcode, Param, ParamKind};
