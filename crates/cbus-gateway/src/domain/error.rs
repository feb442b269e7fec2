//! Gateway error type.

use std::net::SocketAddr;

use thiserror::Error;

/// Failures of the gateway itself.
///
/// Errors on individual client connections never surface here; they only
/// remove that client from the broadcast set.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not be bound (port in use, no permission, ...).
    #[error("failed to bind gateway listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
}
