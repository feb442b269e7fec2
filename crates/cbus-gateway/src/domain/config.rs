//! Gateway listener configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// TCP port clients connect to unless configured otherwise.
pub const DEFAULT_LISTEN_PORT: u16 = 5550;

/// Runtime settings of one [`crate::Gateway`].
///
/// Build it once at startup (from the TOML file and CLI) and pass it to
/// [`crate::Gateway::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Address the listener binds.  Port `0` asks the OS for a free port.
    pub bind_addr: SocketAddr,
    /// Longest a single client write may take before that client is dropped.
    pub write_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Loopback on an OS-chosen port.
    pub fn loopback() -> Self {
        Self::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }
}

impl Default for GatewayConfig {
    /// `0.0.0.0:5550`, two second write timeout.
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            write_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:5550");
        assert_eq!(cfg.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_loopback_uses_ephemeral_port() {
        let cfg = GatewayConfig::loopback();
        assert!(cfg.bind_addr.ip().is_loopback());
        assert_eq!(cfg.bind_addr.port(), 0);
    }
}
