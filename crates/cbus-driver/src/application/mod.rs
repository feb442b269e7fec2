//! Application layer of the driver.
//!
//! - **`transport`** – The [`Transport`](transport::Transport) capability set
//!   that every adapter implements, plus the byte-level reader/writer halves.
//!
//! - **`driver`** – [`Driver`](driver::Driver) and the
//!   [`BusDriver`](driver::BusDriver) contract: connect, close, send,
//!   listener registration and comms-state access.
//!
//! - **`reader`** – The Reader task and its `:`…`;` frame accumulator.
//!
//! - **`writer`** – The Writer task that drains the outbound queue.

pub mod driver;
pub mod reader;
pub mod transport;
pub mod writer;
