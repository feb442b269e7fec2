//! cbus-driver library entry point.
//!
//! # What does the driver do? (for beginners)
//!
//! A control application wants to send and receive CBUS events without
//! caring how it is physically attached to the bus.  The driver provides
//! that single façade:
//!
//! 1. [`Driver::connect`] opens a named port through a [`Transport`]
//!    (a USB serial device or a TCP host) and starts two background tasks.
//! 2. The **Reader** task reads bytes, cuts them into `:`…`;` frames,
//!    decodes them with `cbus-core`, and hands each one to every registered
//!    [`ReceiveListener`].
//! 3. The **Writer** task drains the outbound queue filled by
//!    [`Driver::send`], encodes each event and writes it out.
//! 4. A comms-state machine tracks CONNECTED / DISCONNECTED and tells
//!    subscribers about every change exactly once.

/// Domain layer: comms state, listener contracts, options.
pub mod domain;

/// Application layer: the driver, its Reader/Writer tasks, and the transport contract.
pub mod application;

/// Infrastructure layer: serial, TCP and in-memory transports, plus a recording driver.
pub mod infrastructure;

pub use application::driver::{BusDriver, Driver, DriverError, DriverStats};
pub use application::reader::{FrameAccumulator, Framed};
pub use application::transport::{ByteReader, ByteWriter, Connection, Transport, TransportError};
pub use domain::comms_state::CommsState;
pub use domain::config::{DriverKind, DriverOptions, FeatureFlags};
pub use domain::listeners::{CommsListener, ListenerId, ReceiveListener, Received};
