//! Infrastructure layer for cbus-gateway.
//!
//! - **`server`** – Binds the TCP listener, runs the accept loop, and owns
//!   the tasks that make up a running [`Gateway`](server::Gateway).
//! - **`storage`** – Reads and writes the TOML configuration file.

pub mod server;
pub mod storage;

pub use server::Gateway;
