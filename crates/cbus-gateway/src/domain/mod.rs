//! Domain layer for cbus-gateway.
//!
//! Plain types with no I/O: what the gateway listens on and how it fails.

pub mod config;
pub mod error;

pub use config::{GatewayConfig, DEFAULT_LISTEN_PORT};
pub use error::GatewayError;
