//! The broadcast set: every connected client and how to write to it.
//!
//! # Locking (for beginners)
//!
//! The set is touched from three places at once: the accept loop inserts,
//! per-client readers remove themselves, and the fan-out task writes.  The
//! map sits behind a short-lived `std::sync::Mutex` that is never held across
//! an `.await`.  A broadcast first copies the writer handles out of the map
//! (a *snapshot*), releases the lock, and only then performs the writes.
//! Each writer has its own `tokio::sync::Mutex` so two broadcasts never
//! interleave bytes on the same socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one accepted connection.
pub type ClientId = Uuid;

struct Client<W> {
    addr: SocketAddr,
    writer: Arc<AsyncMutex<W>>,
    reader: Option<AbortHandle>,
}

/// Connected clients keyed by [`ClientId`].
pub struct ClientSet<W> {
    clients: Mutex<HashMap<ClientId, Client<W>>>,
    write_timeout: Duration,
}

impl<W> ClientSet<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// `write_timeout` bounds each individual client write during a broadcast.
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            write_timeout,
        }
    }

    /// Adds a client and returns its new id.
    pub fn insert(&self, addr: SocketAddr, writer: W) -> ClientId {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            Client {
                addr,
                writer: Arc::new(AsyncMutex::new(writer)),
                reader: None,
            },
        );
        id
    }

    /// Remembers the task reading from client `id` so eviction can stop it.
    ///
    /// If the client is already gone the task is aborted straight away.
    pub fn attach_reader(&self, id: ClientId, reader: AbortHandle) {
        match self.lock().get_mut(&id) {
            Some(client) => client.reader = Some(reader),
            None => reader.abort(),
        }
    }

    /// Removes client `id`.  Returns `false` if it was not present.
    ///
    /// The client's reader task is left running; this is what a reader calls
    /// on its own way out.
    pub fn remove(&self, id: ClientId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Peer addresses of all clients, sorted.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.lock().values().map(|c| c.addr).collect();
        addrs.sort();
        addrs
    }

    /// Writes `frame` unmodified to every client.
    ///
    /// A client whose write fails or exceeds the write timeout is evicted
    /// and its reader aborted.  Returns the number of clients that received
    /// the frame.
    pub async fn broadcast(&self, frame: &[u8]) -> usize {
        let targets: Vec<(ClientId, SocketAddr, Arc<AsyncMutex<W>>)> = self
            .lock()
            .iter()
            .map(|(id, c)| (*id, c.addr, Arc::clone(&c.writer)))
            .collect();

        let mut delivered = 0;
        for (id, addr, writer) in targets {
            let write = async {
                let mut w = writer.lock().await;
                w.write_all(frame).await?;
                w.flush().await
            };
            match timeout(self.write_timeout, write).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!("dropping client {addr}: write failed: {e}");
                    self.evict(id);
                }
                Err(_) => {
                    warn!("dropping client {addr}: write timed out");
                    self.evict(id);
                }
            }
        }
        delivered
    }

    /// Removes every client, aborting readers and shutting down writers.
    pub async fn close_all(&self) {
        let drained: Vec<Client<W>> = self.lock().drain().map(|(_, c)| c).collect();
        for client in drained {
            if let Some(reader) = client.reader {
                reader.abort();
            }
            let mut w = client.writer.lock().await;
            if let Err(e) = w.shutdown().await {
                debug!("shutdown of client {} failed: {e}", client.addr);
            }
        }
    }

    fn evict(&self, id: ClientId) {
        if let Some(client) = self.lock().remove(&id) {
            if let Some(reader) = client.reader {
                reader.abort();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, Client<W>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    const FRAME: &[u8] = b":S10A0N9000010002;";

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn set() -> ClientSet<DuplexStream> {
        ClientSet::new(Duration::from_millis(200))
    }

    async fn read_exact(peer: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        peer.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client_byte_identical() {
        // Arrange
        let clients = set();
        let (a, mut peer_a) = duplex(256);
        let (b, mut peer_b) = duplex(256);
        clients.insert(addr(1), a);
        clients.insert(addr(2), b);

        // Act
        let delivered = clients.broadcast(FRAME).await;

        // Assert
        assert_eq!(delivered, 2);
        assert_eq!(read_exact(&mut peer_a, FRAME.len()).await, FRAME);
        assert_eq!(read_exact(&mut peer_b, FRAME.len()).await, FRAME);
    }

    #[tokio::test]
    async fn test_failed_write_evicts_only_that_client() {
        // Arrange
        let clients = set();
        let (a, peer_a) = duplex(256);
        let (b, mut peer_b) = duplex(256);
        let id_a = clients.insert(addr(1), a);
        let id_b = clients.insert(addr(2), b);
        drop(peer_a);

        // Act
        let delivered = clients.broadcast(FRAME).await;

        // Assert
        assert_eq!(delivered, 1);
        assert!(!clients.contains(id_a));
        assert!(clients.contains(id_b));
        assert_eq!(clients.addrs(), vec![addr(2)]);
        assert_eq!(read_exact(&mut peer_b, FRAME.len()).await, FRAME);
    }

    #[tokio::test]
    async fn test_write_error_from_mock_evicts_client() {
        let clients = ClientSet::new(Duration::from_secs(1));
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let id = clients.insert(addr(1), writer);

        assert_eq!(clients.broadcast(FRAME).await, 0);
        assert!(!clients.contains(id));
    }

    #[tokio::test]
    async fn test_stalled_client_is_evicted_after_timeout() {
        // Arrange: a pipe too small for the frame whose far end never reads.
        let clients = ClientSet::new(Duration::from_millis(50));
        let (slow, _slow_peer) = duplex(4);
        let (fast, mut fast_peer) = duplex(256);
        let slow_id = clients.insert(addr(1), slow);
        clients.insert(addr(2), fast);

        // Act
        let delivered = clients.broadcast(FRAME).await;

        // Assert
        assert_eq!(delivered, 1);
        assert!(!clients.contains(slow_id));
        assert_eq!(read_exact(&mut fast_peer, FRAME.len()).await, FRAME);
    }

    #[tokio::test]
    async fn test_eviction_aborts_attached_reader() {
        // Arrange
        let clients = set();
        let (a, peer_a) = duplex(256);
        let id = clients.insert(addr(1), a);
        let reader = tokio::spawn(std::future::pending::<()>());
        clients.attach_reader(id, reader.abort_handle());
        drop(peer_a);

        // Act
        clients.broadcast(FRAME).await;

        // Assert
        let err = reader.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_attach_to_missing_client_aborts_reader() {
        let clients = set();
        let reader = tokio::spawn(std::future::pending::<()>());

        clients.attach_reader(Uuid::new_v4(), reader.abort_handle());

        assert!(reader.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_close_all_empties_set_and_closes_sockets() {
        // Arrange
        let clients = set();
        let (a, mut peer_a) = duplex(256);
        clients.insert(addr(1), a);

        // Act
        clients.close_all().await;

        // Assert: the peer sees end of stream.
        assert!(clients.is_empty());
        let mut buf = [0u8; 1];
        assert_eq!(peer_a.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_remove_reports_presence() {
        let clients = set();
        let (a, _peer) = duplex(16);
        let id = clients.insert(addr(1), a);

        assert!(clients.remove(id));
        assert!(!clients.remove(id));
        assert_eq!(clients.len(), 0);
    }
}
