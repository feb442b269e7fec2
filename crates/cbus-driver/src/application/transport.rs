//! The capability set a transport adapter must provide.
//!
//! # Why a trait? (for beginners)
//!
//! The driver does not care whether frames travel over a USB serial port or
//! a TCP socket.  All it needs is a way to *open* a named connection and,
//! once open, to read bytes, write bytes and close.  Each adapter in
//! `infrastructure::transport` implements [`Transport`] for one kind of link;
//! tests use an in-memory adapter or a `mockall` mock instead.
//!
//! An open connection is split into two independent halves so the Reader
//! and Writer tasks can each own one without sharing a lock.

use std::io;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while opening a transport or listing its ports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port name could not be interpreted (bad `host:port`, say).
    #[error("invalid transport address {0:?}")]
    InvalidAddress(String),

    /// The underlying device or socket refused to open.
    #[error("failed to open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The operating system could not enumerate ports.
    #[error("failed to enumerate ports: {0}")]
    PortEnumeration(String),
}

/// Receiving half of an open connection.
#[async_trait]
pub trait ByteReader: Send {
    /// Reads at least one byte into `buf`.  `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the link once any read still running in the background has
    /// returned.  The Reader awaits this before it exits.
    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sending half of an open connection.
#[async_trait]
pub trait ByteWriter: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flushes and releases the link.  Further writes fail.
    async fn close(&mut self) -> io::Result<()>;
}

/// An open connection, ready to be handed to the Reader and Writer.
pub struct Connection {
    pub reader: Box<dyn ByteReader>,
    pub writer: Box<dyn ByteWriter>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// A family of connections (serial ports, TCP hosts, …).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in log lines, e.g. `"tcp"`.
    fn kind(&self) -> &'static str;

    /// Opens the named port.
    async fn open(&self, name: &str) -> Result<Connection, TransportError>;

    /// Port names worth offering to the user.  Empty when there is nothing to suggest.
    fn available_ports(&self) -> Vec<String>;
}
