//! Transport adapters.
//!
//! - **`tcp`** – `host[:port]` connections to Ethernet interfaces or other gateways.
//! - **`serial`** – USB serial interfaces via the `serialport` crate.
//! - **`mock`** – In-memory pipes for tests.
//! - **`stream`** – Shared wrappers over Tokio `AsyncRead`/`AsyncWrite`.

pub mod mock;
pub mod serial;
pub mod stream;
pub mod tcp;

use std::sync::Arc;

pub use mock::{InMemoryTransport, MockPeer};
pub use serial::SerialTransport;
pub use tcp::{TcpTransport, DEFAULT_TCP_PORT};

use crate::application::transport::Transport;
use crate::domain::config::{DriverKind, DriverOptions};

/// Builds the adapter selected by `options.kind`.
pub fn transport_for(options: &DriverOptions) -> Arc<dyn Transport> {
    match options.kind {
        DriverKind::Serial => Arc::new(SerialTransport::new(options.baud_rate)),
        DriverKind::Tcp => Arc::new(TcpTransport::new(options.ports.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_for_selects_by_kind() {
        let tcp = DriverOptions {
            kind: DriverKind::Tcp,
            ports: vec!["cbus-eth:5550".into()],
            ..DriverOptions::default()
        };
        let t = transport_for(&tcp);
        assert_eq!(t.kind(), "tcp");
        assert_eq!(t.available_ports(), vec!["cbus-eth:5550".to_string()]);

        let serial = DriverOptions::default();
        assert_eq!(transport_for(&serial).kind(), "serial");
    }
}
