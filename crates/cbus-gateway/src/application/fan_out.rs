//! Fan-out: every frame the driver reads goes to every client.
//!
//! Listener callbacks run on the driver's Reader task and must not block, so
//! [`BroadcastListener`] only copies the wire bytes onto an unbounded channel.
//! [`run_fan_out`] drains that channel on its own task and performs the
//! socket writes.

use std::sync::Arc;

use cbus_driver::{ReceiveListener, Received};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::clients::ClientSet;

/// Driver listener that forwards the exact wire bytes of each frame.
pub struct BroadcastListener {
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

impl BroadcastListener {
    /// Creates the listener together with the receiving end for [`run_fan_out`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (Self { frames }, rx)
    }
}

impl ReceiveListener for BroadcastListener {
    fn on_receive(&self, received: &Received) {
        // Decoded or not, clients get what was on the wire.
        if self.frames.send(received.frame().to_vec()).is_err() {
            trace!("fan-out task gone; frame not rebroadcast");
        }
    }
}

/// Writes each frame from `frames` to all clients until the channel closes.
pub async fn run_fan_out<W>(mut frames: mpsc::UnboundedReceiver<Vec<u8>>, clients: Arc<ClientSet<W>>)
where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(frame) = frames.recv().await {
        if clients.is_empty() {
            continue;
        }
        let delivered = clients.broadcast(&frame).await;
        trace!(
            "rebroadcast {} to {delivered} client(s)",
            String::from_utf8_lossy(&frame)
        );
    }
    debug!("fan-out stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
