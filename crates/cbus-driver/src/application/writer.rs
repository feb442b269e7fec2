//! The Writer unit: drains the outbound queue onto the transport.

use std::sync::Arc;
use std::time::Duration;

use cbus_core::{dump, encode_frame, Event};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use super::driver::DriverShared;
use super::transport::ByteWriter;
use crate::domain::comms_state::CommsState;

/// Runs until `shutdown` fires, the queue closes, or a write fails.
///
/// Every exit path closes the writer half and sets the comms state to
/// DISCONNECTED.
pub(crate) async fn run_writer(
    mut writer: Box<dyn ByteWriter>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Event>>>,
    mut shutdown: watch::Receiver<bool>,
    shared: Arc<DriverShared>,
    write_delay: Duration,
) {
    // One session at a time, so this lock is only ever contended during teardown.
    let mut queue = queue.lock().await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = queue.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };
        shared.record_dequeued();

        if shared.comms.current() != CommsState::Connected {
            shared.record_dropped();
            debug!("not connected; discarding > {}", dump(&event, shared.base()));
            continue;
        }

        let frame = encode_frame(&event);
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            warn!("transport write failed: {e}");
            shared.record_dropped();
            break;
        }
        shared.record_sent();
        debug!("> {}", dump(&event, shared.base()));

        if !write_delay.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(write_delay) => {}
            }
        }
    }

    if let Err(e) = writer.close().await {
        debug!("closing transport writer: {e}");
    }
    debug!("writer stopped");
    shared.comms.set(CommsState::Disconnected);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
