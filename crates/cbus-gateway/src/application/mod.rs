//! Application layer of the gateway.
//!
//! - **`clients`** – [`ClientSet`](clients::ClientSet): the broadcast set of
//!   connected clients and the fan-out write to all of them.
//!
//! - **`fan_out`** – The driver listener that feeds every received frame to
//!   the fan-out task.
//!
//! - **`fan_in`** – The per-client reader that decodes client frames and
//!   queues them on the driver.
//!
//! - **`reconnect`** – Supervisor that reopens the bus connection after a drop.
//!
//! Nothing here opens sockets; the infrastructure layer hands in any
//! `AsyncRead`/`AsyncWrite` halves, which keeps these units testable with
//! in-memory pipes.

pub mod clients;
pub mod fan_in;
pub mod fan_out;
pub mod reconnect;

pub use clients::{ClientId, ClientSet};
pub use fan_in::{forward_client_frames, FanInStats};
pub use fan_out::{run_fan_out, BroadcastListener};
pub use reconnect::keep_connected;
