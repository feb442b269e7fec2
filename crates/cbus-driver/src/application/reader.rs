//! The Reader unit: turns an inbound byte stream into frames.
//!
//! # Framing (for beginners)
//!
//! A byte stream has no message boundaries of its own; a single `read` may
//! return half a frame, or three frames and the start of a fourth.  The
//! [`FrameAccumulator`] is a two-state machine fed one byte at a time:
//!
//! ```text
//!            ':' (reset buffer)
//!   SCANNING ──────────────────▶ ACCUMULATING ──┐ any byte: append
//!      ▲                              │   ▲─────┘
//!      └──────── ';' (emit frame) ────┘
//! ```
//!
//! A `:` seen while accumulating discards the partial frame and starts over.
//! Bytes outside a frame are ignored.  Bytes inside a frame are kept exactly
//! as read, so a frame carrying non-ASCII garbage is passed on unchanged.  A frame that grows past
//! [`MAX_FRAME_CHARS`] is emitted as overflow and scanning resumes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::driver::DriverShared;
use super::transport::ByteReader;
use crate::domain::comms_state::CommsState;

/// Longest frame accepted, in bytes, between `:` and `;` inclusive.
pub const MAX_FRAME_CHARS: usize = 64;

const READ_BUF_SIZE: usize = 64;

/// Output of the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framed {
    /// A complete `:`…`;` frame.
    Frame(Vec<u8>),
    /// Bytes that reached [`MAX_FRAME_CHARS`] without a terminator.
    Overflow(Vec<u8>),
}

/// Byte-at-a-time `:`…`;` framer.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    accumulating: bool,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte, returning a frame when `byte` completes one.
    pub fn push(&mut self, byte: u8) -> Option<Framed> {
        match byte {
            b':' => {
                self.buf.clear();
                self.buf.push(b':');
                self.accumulating = true;
                None
            }
            _ if !self.accumulating => None,
            b';' => {
                self.buf.push(b';');
                self.accumulating = false;
                Some(Framed::Frame(std::mem::take(&mut self.buf)))
            }
            _ => {
                self.buf.push(byte);
                if self.buf.len() >= MAX_FRAME_CHARS {
                    self.accumulating = false;
                    Some(Framed::Overflow(std::mem::take(&mut self.buf)))
                } else {
                    None
                }
            }
        }
    }

    /// Feeds a slice, collecting every frame it completes.
    pub fn push_all(&mut self, bytes: &[u8]) -> Vec<Framed> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    pub fn is_accumulating(&self) -> bool {
        self.accumulating
    }
}

/// Runs until the stream ends, a read fails, or `shutdown` fires.
///
/// Every completed frame goes to [`DriverShared::dispatch`].  On exit the
/// comms state is set to DISCONNECTED.
pub(crate) async fn run_reader(
    mut reader: Box<dyn ByteReader>,
    mut shutdown: watch::Receiver<bool>,
    shared: Arc<DriverShared>,
) {
    let mut framer = FrameAccumulator::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        if *shutdown.borrow() {
            break;
        }

        let n = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    info!("transport reached end of stream");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("transport read failed: {e}");
                    break;
                }
            },
        };

        for framed in framer.push_all(&buf[..n]) {
            shared.dispatch(framed);
        }
    }

    if let Err(e) = reader.close().await {
        debug!("closing transport reader: {e}");
    }
    debug!("reader stopped");
    shared.comms.set(CommsState::Disconnected);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listeners::Received;
    use crate::infrastructure::transport::stream::StreamReader;
    use cbus_core::NumberBase;
    use std::sync::Mutex;

    fn frames(input: &str) -> Vec<Framed> {
        FrameAccumulator::new().push_all(input.as_bytes())
    }

    #[test]
    fn test_single_frame() {
        assert_eq!(
            frames(":S10A0N9000010002;"),
            vec![Framed::Frame(b":S10A0N9000010002;".to_vec())]
        );
    }

    #[test]
    fn test_bytes_outside_frames_are_ignored() {
        assert_eq!(
            frames("noise\r\n:SB020N0D;\r\n"),
            vec![Framed::Frame(b":SB020N0D;".to_vec())]
        );
    }

    #[test]
    fn test_colon_restarts_a_partial_frame() {
        assert_eq!(
            frames(":SB0:SB020N0D;"),
            vec![Framed::Frame(b":SB020N0D;".to_vec())]
        );
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut acc = FrameAccumulator::new();
        assert!(acc.push_all(b":SB02").is_empty());
        assert!(acc.is_accumulating());
        assert_eq!(
            acc.push_all(b"0N0D;:SB0"),
            vec![Framed::Frame(b":SB020N0D;".to_vec())]
        );
        assert!(acc.is_accumulating());
    }

    #[test]
    fn test_non_ascii_bytes_are_kept_verbatim() {
        // Arrange
        let input: &[u8] = b"\xC3:S\xFF0N0D;";

        // Act
        let out = FrameAccumulator::new().push_all(input);

        // Assert
        assert_eq!(out, vec![Framed::Frame(input[1..].to_vec())]);
    }

    #[test]
    fn test_overlong_frame_is_reported_as_overflow() {
        // Arrange
        let long = format!(":{}", "A".repeat(100));

        // Act
        let out = frames(&long);

        // Assert
        assert_eq!(out.len(), 1);
        match &out[0] {
            Framed::Overflow(text) => assert_eq!(text.len(), MAX_FRAME_CHARS),
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reader_dispatches_frames_and_disconnects_at_eof() {
        // Arrange
        let stream = tokio_test::io::Builder::new()
            .read(b":S10A0N90000")
            .read(b"10002;:SB020N;")
            .build();
        let shared = Arc::new(DriverShared::new(NumberBase::Hex));
        shared.comms.set(CommsState::Connected);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        shared.listeners.add(Arc::new(move |r: &Received| {
            sink.lock().unwrap().push(r.clone());
        }));
        let (_tx, rx) = watch::channel(false);

        // Act
        run_reader(Box::new(StreamReader::new(stream)), rx, Arc::clone(&shared)).await;

        // Assert
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event().map(|e| e.node_number()), Some(1));
        assert!(matches!(&seen[1], Received::Raw { bytes, error: Some(_) } if bytes == b":SB020N;"));
        assert_eq!(shared.comms.current(), CommsState::Disconnected);
        let stats = shared.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.unparsed, 1);
    }

    #[tokio::test]
    async fn test_reader_delivers_non_ascii_frame_bytes_unchanged() {
        // Arrange
        let wire: &[u8] = b":S\xC3\xBF;";
        let stream = tokio_test::io::Builder::new().read(wire).build();
        let shared = Arc::new(DriverShared::new(NumberBase::Hex));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        shared.listeners.add(Arc::new(move |r: &Received| {
            sink.lock().unwrap().push(r.frame().to_vec());
        }));
        let (_tx, rx) = watch::channel(false);

        // Act
        run_reader(Box::new(StreamReader::new(stream)), rx, Arc::clone(&shared)).await;

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![wire.to_vec()]);
    }

    #[tokio::test]
    async fn test_reader_exits_on_read_error() {
        let stream = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let shared = Arc::new(DriverShared::new(NumberBase::Hex));
        shared.comms.set(CommsState::Connected);
        let (_tx, rx) = watch::channel(false);

        run_reader(Box::new(StreamReader::new(stream)), rx, Arc::clone(&shared)).await;

        assert_eq!(shared.comms.current(), CommsState::Disconnected);
    }

    #[tokio::test]
    async fn test_reader_stops_when_shutdown_is_signalled() {
        // Arrange: a peer that never sends anything.
        let (driver_side, _peer) = tokio::io::duplex(64);
        let shared = Arc::new(DriverShared::new(NumberBase::Hex));
        shared.comms.set(CommsState::Connected);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_reader(
            Box::new(StreamReader::new(driver_side)),
            rx,
            Arc::clone(&shared),
        ));

        // Act
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("reader must stop promptly")
            .unwrap();

        // Assert
        assert_eq!(shared.comms.current(), CommsState::Disconnected);
    }
}
