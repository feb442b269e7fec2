//! TCP server: accept loop and the running [`Gateway`] handle.
//!
//! # Task layout
//!
//! ```text
//!               ┌──────────── accept loop (200 ms accept timeout) ───────────┐
//!  TcpListener ─┤  insert write half into ClientSet                         │
//!               └─ spawn client reader ─▶ forward_client_frames ─▶ driver.send
//!
//!  driver Reader ─▶ BroadcastListener ─▶ mpsc ─▶ fan-out task ─▶ ClientSet::broadcast
//! ```
//!
//! Each client reader removes its own entry from the set when the client
//! goes away.  The fan-out task evicts clients whose writes fail.
//!
//! # Shutdown
//!
//! [`Gateway::shutdown`] clears the `running` flag (the accept loop notices
//! within 200 ms), unregisters the broadcast listener from the driver, waits
//! for the accept loop, then closes every client socket.  The driver itself
//! is left connected; it belongs to the caller.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cbus_driver::{BusDriver, ListenerId};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::application::clients::{ClientId, ClientSet};
use crate::application::fan_in::forward_client_frames;
use crate::application::fan_out::{run_fan_out, BroadcastListener};
use crate::domain::{GatewayConfig, GatewayError};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

type Clients = ClientSet<OwnedWriteHalf>;

/// A running gateway.
pub struct Gateway {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    clients: Arc<Clients>,
    driver: Arc<dyn BusDriver>,
    listener_id: ListenerId,
    accept_task: JoinHandle<()>,
    fan_out_task: JoinHandle<()>,
}

impl Gateway {
    /// Binds `config.bind_addr`, registers with `driver`, and starts serving.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Bind`] if the listener cannot be bound, or
    /// [`GatewayError::Io`] if its local address cannot be read.
    pub async fn start(
        driver: Arc<dyn BusDriver>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("gateway listening on {local_addr}");

        let clients: Arc<Clients> = Arc::new(ClientSet::new(config.write_timeout));
        let running = Arc::new(AtomicBool::new(true));

        let (broadcast, frames) = BroadcastListener::channel();
        let listener_id = driver.add_listener(Arc::new(broadcast));
        let fan_out_task = tokio::spawn(run_fan_out(frames, Arc::clone(&clients)));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&driver),
            Arc::clone(&clients),
            Arc::clone(&running),
        ));

        Ok(Self {
            local_addr,
            running,
            clients,
            driver,
            listener_id,
            accept_task,
            fan_out_task,
        })
    }

    /// The bound address, with the real port when `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Peer addresses of the connected clients, sorted.
    pub fn client_addrs(&self) -> Vec<SocketAddr> {
        self.clients.addrs()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops accepting, detaches from the driver, and disconnects all clients.
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::Relaxed);
        self.driver.remove_listener(self.listener_id);

        if let Err(e) = self.accept_task.await {
            error!("gateway accept loop ended abnormally: {e}");
        }
        self.fan_out_task.abort();
        self.clients.close_all().await;
        info!("gateway on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    driver: Arc<dyn BusDriver>,
    clients: Arc<Clients>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not set TCP_NODELAY for {addr}: {e}");
                }
                let (read_half, write_half) = stream.into_split();
                let id = clients.insert(addr, write_half);
                info!("client {addr} connected ({} total)", clients.len());

                let reader = tokio::spawn(client_reader(
                    id,
                    addr,
                    read_half,
                    Arc::clone(&driver),
                    Arc::clone(&clients),
                ));
                clients.attach_reader(id, reader.abort_handle());
            }
            Ok(Err(e)) => error!("gateway accept error: {e}"),
            // No connection in the last poll interval; re-check `running`.
            Err(_) => {}
        }
    }
    debug!("gateway accept loop stopped");
}

async fn client_reader(
    id: ClientId,
    addr: SocketAddr,
    read_half: tokio::net::tcp::OwnedReadHalf,
    driver: Arc<dyn BusDriver>,
    clients: Arc<Clients>,
) {
    let stats = forward_client_frames(addr, read_half, driver.as_ref()).await;
    clients.remove(id);
    debug!(
        "client {addr} reader done: {} forwarded, {} rejected",
        stats.forwarded, stats.rejected
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
