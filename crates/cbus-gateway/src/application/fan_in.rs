//! Fan-in: frames typed by one client are queued on the shared driver.

use std::net::SocketAddr;

use cbus_core::decode_frame;
use cbus_driver::{BusDriver, FrameAccumulator, Framed};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

const READ_BUF_SIZE: usize = 256;

/// What one client reader did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanInStats {
    /// Frames decoded and passed to `send`.
    pub forwarded: u64,
    /// Frames that failed to decode or overflowed.
    pub rejected: u64,
}

/// Reads frames from one client until it disconnects or a read fails.
///
/// Each `:`…`;` frame is decoded and handed to [`BusDriver::send`].  A frame
/// that does not decode is logged and skipped; the reader keeps going.
pub async fn forward_client_frames<R>(
    addr: SocketAddr,
    mut reader: R,
    driver: &dyn BusDriver,
) -> FanInStats
where
    R: AsyncRead + Unpin,
{
    let mut framer = FrameAccumulator::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut stats = FanInStats::default();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                info!("client {addr} disconnected");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("client {addr} read failed: {e}");
                break;
            }
        };

        for framed in framer.push_all(&buf[..n]) {
            match framed {
                Framed::Frame(frame) => match decode_frame(&frame) {
                    Ok(event) => {
                        debug!("client {addr} > {}", String::from_utf8_lossy(&frame));
                        driver.send(event);
                        stats.forwarded += 1;
                    }
                    Err(e) => {
                        warn!("client {addr}: discarding {}: {e}", String::from_utf8_lossy(&frame));
                        stats.rejected += 1;
                    }
                },
                Framed::Overflow(bytes) => {
                    warn!("client {addr}: discarding unterminated {}", String::from_utf8_lossy(&bytes));
                    stats.rejected += 1;
                }
            }
        }
    }

    stats
}

// ── Tests ─────────────────────────────────────────────────────────────────────
