//! In-memory transport for tests.
//!
//! # Why an in-memory transport?
//!
//! The real adapters need a USB interface or a listening TCP peer.  The
//! `InMemoryTransport` instead connects the driver to one end of a Tokio
//! duplex pipe and hands the other end, a [`MockPeer`], to the test.  The
//! test then plays the part of the CAN interface: it writes frames that the
//! driver should read and reads frames the driver wrote.
//!
//! # Usage in tests
//!
//! ```ignore
//! let transport = Arc::new(InMemoryTransport::new());
//! let driver = Driver::new(transport.clone(), DriverOptions::default());
//! driver.connect("mock0").await?;
//!
//! let mut peer = transport.take_peer().expect("connected");
//! peer.send(":S10A0N9000010002;").await?;
//! ```
//!
//! Call [`InMemoryTransport::fail_next_open`] to make the next `open` fail.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::stream::{StreamReader, StreamWriter};
use crate::application::transport::{Connection, Transport, TransportError};

const PIPE_CAPACITY: usize = 4096;

/// The test's end of an in-memory connection.
pub struct MockPeer {
    /// Port name the driver opened.
    pub name: String,
    stream: DuplexStream,
}

impl MockPeer {
    /// Writes `bytes` as if the interface had received them from the bus.
    pub async fn send(&mut self, bytes: impl AsRef<[u8]>) -> io::Result<()> {
        self.stream.write_all(bytes.as_ref()).await
    }

    /// Reads until the next `;`, returning everything read including it.
    pub async fn read_frame(&mut self) -> io::Result<String> {
        let mut out = String::new();
        loop {
            let byte = self.stream.read_u8().await?;
            out.push(byte as char);
            if byte == b';' {
                return Ok(out);
            }
        }
    }

    /// Closes the pipe, which the driver's Reader sees as end of stream.
    pub async fn hang_up(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// A [`Transport`] backed by in-memory pipes.
#[derive(Default)]
pub struct InMemoryTransport {
    ports: Vec<String>,
    fail_next: AtomicBool,
    opened: Mutex<Vec<String>>,
    peer: Mutex<Option<MockPeer>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the names returned by `available_ports`.
    pub fn with_ports(ports: Vec<String>) -> Self {
        Self {
            ports,
            ..Self::default()
        }
    }

    /// Makes the next `open` fail with `ConnectionRefused`.
    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Takes the peer of the most recent successful `open`.
    pub fn take_peer(&self) -> Option<MockPeer> {
        self.peer.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Every port name passed to `open`, in order, including failed attempts.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, name: &str) -> Result<Connection, TransportError> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Open {
                name: name.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refused"),
            });
        }

        let (driver_side, peer_side) = tokio::io::duplex(PIPE_CAPACITY);
        let (read_half, write_half) = tokio::io::split(driver_side);
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = Some(MockPeer {
            name: name.to_string(),
            stream: peer_side,
        });

        Ok(Connection {
            reader: Box::new(StreamReader::new(read_half)),
            writer: Box::new(StreamWriter::new(write_half)),
        })
    }

    fn available_ports(&self) -> Vec<String> {
        self.ports.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_hands_peer_to_test() {
        let transport = InMemoryTransport::new();

        let mut conn = transport.open("mock0").await.unwrap();
        let mut peer = transport.take_peer().expect("peer after open");
        peer.send(":SB020N0D;").await.unwrap();
        conn.writer.write_all(b":SB000N0D;").await.unwrap();

        let mut buf = [0u8; 10];
        let mut filled = 0;
        while filled < buf.len() {
            filled += conn.reader.read(&mut buf[filled..]).await.unwrap();
        }
        assert_eq!(&buf, b":SB020N0D;");
        assert_eq!(peer.read_frame().await.unwrap(), ":SB000N0D;");
        assert_eq!(peer.name, "mock0");
    }

    #[tokio::test]
    async fn test_fail_next_open_fails_once() {
        let transport = InMemoryTransport::new();
        transport.fail_next_open();

        assert!(transport.open("a").await.is_err());
        assert!(transport.open("b").await.is_ok());
        assert_eq!(transport.opened(), vec!["a".to_string(), "b".to_string()]);
    }
}
