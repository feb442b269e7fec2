//! Serial adapter for USB CAN interfaces (CANUSB4 and similar).
//!
//! The `serialport` crate is blocking.  Each read or write runs on Tokio's
//! blocking pool via `spawn_blocking`, and reads use a short timeout so a
//! blocked read returns regularly.  The reader and writer each own their own
//! handle to the device (`try_clone`), so neither waits on the other.
//!
//! Ports are opened exclusively.  A cancelled read keeps running on the
//! blocking pool until its timeout, so the reader's handle sits behind a
//! mutex and [`ByteReader::close`] waits for that read before dropping it.
//! Reopening the same device right after a teardown therefore succeeds.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use tokio::task;
use tracing::{debug, warn};

use crate::application::transport::{ByteReader, ByteWriter, Connection, Transport, TransportError};

/// Read timeout of the underlying port.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens serial ports at a fixed baud rate.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    baud_rate: u32,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    /// Lists the system's serial ports.
    pub fn enumerate() -> Result<Vec<String>, TransportError> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .map_err(|e| TransportError::PortEnumeration(e.to_string()))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> &'static str {
        "serial"
    }

    async fn open(&self, name: &str) -> Result<Connection, TransportError> {
        let path = name.to_string();
        let baud_rate = self.baud_rate;
        let open_err = |source: io::Error| TransportError::Open {
            name: name.to_string(),
            source,
        };

        debug!(port = %path, baud_rate, "opening serial port");
        let port = task::spawn_blocking(move || {
            serialport::new(&path, baud_rate)
                .timeout(READ_TIMEOUT)
                .open()
                .map_err(io::Error::from)
        })
        .await
        .map_err(|e| open_err(io::Error::other(e)))?
        .map_err(open_err)?;

        let writer_port = port.try_clone().map_err(|e| open_err(io::Error::from(e)))?;
        Ok(Connection {
            reader: Box::new(SerialReader::new(port)),
            writer: Box::new(SerialWriter {
                port: Some(writer_port),
            }),
        })
    }

    fn available_ports(&self) -> Vec<String> {
        match Self::enumerate() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port closed")
}

struct SerialReader<P> {
    // Locked for the whole of each blocking read; `None` once closed.
    port: Arc<Mutex<Option<P>>>,
}

impl<P> SerialReader<P> {
    fn new(port: P) -> Self {
        Self {
            port: Arc::new(Mutex::new(Some(port))),
        }
    }
}

#[async_trait]
impl<P> ByteReader for SerialReader<P>
where
    P: Read + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let port = Arc::clone(&self.port);
            let len = buf.len();
            let (result, chunk) = task::spawn_blocking(move || {
                let mut chunk = vec![0u8; len];
                let mut guard = port.lock().unwrap_or_else(PoisonError::into_inner);
                let result = match guard.as_mut() {
                    Some(device) => device.read(&mut chunk),
                    None => Err(closed()),
                };
                (result, chunk)
            })
            .await
            .map_err(io::Error::other)?;

            match result {
                Ok(n) => {
                    buf[..n].copy_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        let port = Arc::clone(&self.port);
        task::spawn_blocking(move || {
            port.lock().unwrap_or_else(PoisonError::into_inner).take();
        })
        .await
        .map_err(io::Error::other)
    }
}

struct SerialWriter {
    port: Option<Box<dyn SerialPort>>,
}

#[async_trait]
impl ByteWriter for SerialWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut port = self.port.take().ok_or_else(closed)?;
        let data = bytes.to_vec();
        let (port, result) = task::spawn_blocking(move || {
            let result = port.write_all(&data).and_then(|()| port.flush());
            (port, result)
        })
        .await
        .map_err(io::Error::other)?;
        self.port = Some(port);
        result
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the handle releases the device.
        self.port.take();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
