//! Keeps the bus connection open.
//!
//! The driver itself never retries; when its Reader or Writer sees the
//! transport fail it moves to DISCONNECTED and stops.  The gateway binary
//! runs [`keep_connected`] alongside the server so that a pulled USB cable
//! or a rebooted Ethernet interface is picked up again without a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cbus_driver::{BusDriver, CommsState};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// How often the `running` flag is checked while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Reconnects `driver` to `port` every `interval` while it is DISCONNECTED.
///
/// Returns once `running` is cleared.  Returns the number of connection
/// attempts made.
pub async fn keep_connected(
    driver: Arc<dyn BusDriver>,
    port: String,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> u64 {
    let mut attempts = 0;
    let mut next_attempt = Instant::now() + interval;

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= next_attempt {
            next_attempt = now + interval;
            if driver.comms_state() == CommsState::Disconnected {
                attempts += 1;
                match driver.connect(&port).await {
                    Ok(()) => info!("reconnected to {port}"),
                    Err(e) => warn!("reconnect to {port} failed: {e}"),
                }
            }
        }
        let wait = next_attempt.saturating_duration_since(Instant::now());
        sleep(wait.clamp(MIN_WAIT, POLL_INTERVAL)).await;
    }

    attempts
}
