//! Domain layer: connection state, listener contracts, and driver options.
//!
//! Nothing here touches a socket or spawns a task.

pub mod comms_state;
pub mod config;
pub mod listeners;
