//! cbus-gateway library crate.
//!
//! Shares one physical CBUS connection among any number of TCP clients.
//!
//! # Architecture
//!
//! ```text
//! CAN interface (serial or TCP)
//!         ↕
//!   cbus-driver::Driver
//!         ↕  listener / send()
//! [cbus-gateway]
//!   ├── domain/           GatewayConfig, GatewayError
//!   ├── application/      Client set, fan-out, fan-in, reconnect supervisor
//!   └── infrastructure/
//!         ├── server/     TCP accept loop and Gateway handle
//!         └── storage/    TOML configuration file
//!         ↕
//! TCP clients  (raw `:`…`;` frames, no handshake)
//! ```
//!
//! # For beginners: what does "fan-out / fan-in" mean?
//!
//! *Fan-out* is one-to-many: every frame the driver reads from the bus is
//! copied, byte for byte, to every connected client.  *Fan-in* is
//! many-to-one: frames typed by any client are decoded and queued on the
//! single driver, which writes them to the bus.

/// Domain layer: gateway configuration and errors.
pub mod domain;

/// Application layer: broadcast set, client readers, reconnect loop.
pub mod application;

/// Infrastructure layer: TCP server and config file storage.
pub mod infrastructure;

pub use domain::{GatewayConfig, GatewayError, DEFAULT_LISTEN_PORT};
pub use infrastructure::server::Gateway;
