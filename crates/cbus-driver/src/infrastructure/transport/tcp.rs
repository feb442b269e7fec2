//! TCP adapter: connects to a CBUS Ethernet interface or another gateway.
//!
//! Port names are `host[:port]`; the port defaults to [`DEFAULT_TCP_PORT`].
//! IPv6 literals are written bare (`::1`) or bracketed (`[::1]:5550`).

use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::stream::{StreamReader, StreamWriter};
use crate::application::transport::{Connection, Transport, TransportError};

/// Port used when a port name carries no explicit `:port`.
pub const DEFAULT_TCP_PORT: u16 = 5555;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens TCP connections to `host[:port]` targets.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    hosts: Vec<String>,
}

impl TcpTransport {
    /// `hosts` are the configured targets returned by `available_ports`.
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

/// Splits `host[:port]`, applying [`DEFAULT_TCP_PORT`] when no port is given.
pub fn parse_host_port(name: &str) -> Result<(String, u16), TransportError> {
    let name = name.trim();
    let invalid = || TransportError::InvalidAddress(name.to_string());

    if let Ok(addr) = name.parse::<SocketAddr>() {
        return Ok((addr.ip().to_string(), addr.port()));
    }
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok((ip.to_string(), DEFAULT_TCP_PORT));
    }
    if let Some(ip) = name.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        let ip: Ipv6Addr = ip.parse().map_err(|_| invalid())?;
        return Ok((ip.to_string(), DEFAULT_TCP_PORT));
    }

    let (host, port) = match name.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (name, DEFAULT_TCP_PORT),
    };
    // Anything still holding ':' or brackets is a malformed IPv6 form.
    if host.is_empty() || host.contains([':', '[', ']']) {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    async fn open(&self, name: &str) -> Result<Connection, TransportError> {
        let (host, port) = parse_host_port(name)?;
        let open_err = |source: io::Error| TransportError::Open {
            name: name.to_string(),
            source,
        };

        debug!(%host, port, "opening TCP connection");
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| open_err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
            .map_err(open_err)?;
        // Frames are tiny; send each one as soon as it is written.
        stream.set_nodelay(true).map_err(open_err)?;

        let (read_half, write_half) = stream.into_split();
        Ok(Connection {
            reader: Box::new(StreamReader::new(read_half)),
            writer: Box::new(StreamWriter::new(write_half)),
        })
    }

    fn available_ports(&self) -> Vec<String> {
        self.hosts.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_host_port_with_explicit_port() {
        assert_eq!(
            parse_host_port("192.168.1.20:5550").unwrap(),
            ("192.168.1.20".to_string(), 5550)
        );
    }

    #[test]
    fn test_parse_host_port_defaults_to_5555() {
        assert_eq!(
            parse_host_port("cbus-eth").unwrap(),
            ("cbus-eth".to_string(), 5555)
        );
    }

    #[test]
    fn test_parse_host_port_rejects_bad_port_and_empty_host() {
        assert!(matches!(
            parse_host_port("host:notaport"),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_host_port(":5555"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_host_port_understands_ipv6_literals() {
        assert_eq!(parse_host_port("::1").unwrap(), ("::1".to_string(), 5555));
        assert_eq!(parse_host_port("[::1]").unwrap(), ("::1".to_string(), 5555));
        assert_eq!(
            parse_host_port("[fe80::2]:5550").unwrap(),
            ("fe80::2".to_string(), 5550)
        );
        assert!(matches!(
            parse_host_port("[::1:5550"),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_available_ports_are_the_configured_hosts() {
        let t = TcpTransport::new(vec!["a:1".into(), "b".into()]);
        assert_eq!(t.available_ports(), vec!["a:1".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_open_connects_and_carries_bytes_both_ways() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = TcpTransport::default();

        // Act
        let mut conn = transport.open(&addr.to_string()).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();
        conn.writer.write_all(b":SB000N0D;").await.unwrap();
        server_side.write_all(b":SB020N0D;").await.unwrap();

        // Assert
        let mut got = [0u8; 10];
        server_side.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b":SB000N0D;");
        let mut back = [0u8; 10];
        let mut filled = 0;
        while filled < back.len() {
            filled += conn.reader.read(&mut back[filled..]).await.unwrap();
        }
        assert_eq!(&back, b":SB020N0D;");
    }

    #[tokio::test]
    async fn test_open_refused_is_open_error() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let result = TcpTransport::default().open(&addr.to_string()).await;
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }
}
