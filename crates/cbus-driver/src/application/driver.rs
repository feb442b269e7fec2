//! The transport-agnostic driver façade.
//!
//! # Lifecycle (for beginners)
//!
//! A [`Driver`] is created once per logical bus and lives for the whole
//! program.  Each successful [`Driver::connect`] creates a *session*: one
//! open [`Connection`](super::transport::Connection), one Reader task and
//! one Writer task.  `connect` and `close` always stop the previous session
//! first, waiting briefly for its tasks and aborting them if they hang, so
//! two sessions never touch the same link.
//!
//! The outbound queue, the listener registry and the comms-state subscribers
//! belong to the driver, not the session, so they survive reconnects.
//!
//! ```text
//!   send(event) ──▶ [outbound queue] ──▶ Writer ──▶ ByteWriter
//!   listeners   ◀── dispatch ◀── Reader ◀── ByteReader
//! ```
//!
//! # Drop policy
//!
//! The queue is unbounded.  To keep it from growing while nothing drains
//! it, [`Driver::send`] drops events immediately while the driver is
//! DISCONNECTED, and the Writer drops any event it dequeues while not
//! CONNECTED.  Both cases are logged at `warn`/`debug` and counted in
//! [`DriverStats::dropped`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cbus_core::{decode_frame, dump, Event, NumberBase};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reader::{run_reader, Framed};
use super::transport::{Transport, TransportError};
use super::writer::run_writer;
use crate::domain::comms_state::{CommsState, CommsStateMachine};
use crate::domain::config::DriverOptions;
use crate::domain::listeners::{
    CommsListener, ListenerId, ListenerRegistry, ReceiveListener, Received,
};

/// How long teardown waits for a task before aborting it.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors reported by driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The transport could not be opened.  The driver stays DISCONNECTED.
    #[error("could not connect to {name}")]
    Connect {
        name: String,
        #[source]
        source: TransportError,
    },
}

/// Counters describing the driver's traffic since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Frames completed by the Reader, decoded or not.
    pub received: u64,
    /// Frames that failed to decode and went out on the raw path.
    pub unparsed: u64,
    /// Events written to the transport.
    pub sent: u64,
    /// Events discarded because the driver was not connected.
    pub dropped: u64,
    /// Events waiting in the outbound queue.
    pub queued: usize,
}

/// The operations every driver offers, whatever the transport.
///
/// The gateway and applications program against this trait so they can be
/// tested with a recording fake.
#[async_trait]
pub trait BusDriver: Send + Sync {
    /// Replaces any current connection with a new one to `name`.
    async fn connect(&self, name: &str) -> Result<(), DriverError>;

    /// Stops the current connection, if any, and sets DISCONNECTED.
    async fn close(&self);

    /// Queues `event` for transmission without waiting.
    fn send(&self, event: Event);

    fn add_listener(&self, listener: Arc<dyn ReceiveListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn comms_state(&self) -> CommsState;

    fn subscribe_comms_state(&self, listener: Arc<dyn CommsListener>) -> ListenerId;

    fn unsubscribe_comms_state(&self, id: ListenerId) -> bool;

    /// Transport-specific port suggestions.
    fn available_ports(&self) -> Vec<String>;
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct StatCounters {
    received: AtomicU64,
    unparsed: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    queued: AtomicUsize,
}

/// State reachable from the driver handle and from its tasks.
pub(crate) struct DriverShared {
    pub(crate) listeners: ListenerRegistry<dyn ReceiveListener>,
    pub(crate) comms: CommsStateMachine,
    base: NumberBase,
    counters: StatCounters,
}

impl DriverShared {
    pub(crate) fn new(base: NumberBase) -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            comms: CommsStateMachine::new(),
            base,
            counters: StatCounters::default(),
        }
    }

    /// Decodes a framed chunk and hands the result to every listener.
    pub(crate) fn dispatch(&self, framed: Framed) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let received = match framed {
            Framed::Frame(frame) => match decode_frame(&frame) {
                Ok(event) => {
                    debug!("< {}", dump(&event, self.base));
                    Received::Event { event, frame }
                }
                Err(error) => {
                    self.counters.unparsed.fetch_add(1, Ordering::Relaxed);
                    debug!("< unparsed frame {}: {error}", String::from_utf8_lossy(&frame));
                    Received::Raw {
                        bytes: frame,
                        error: Some(error),
                    }
                }
            },
            Framed::Overflow(bytes) => {
                self.counters.unparsed.fetch_add(1, Ordering::Relaxed);
                debug!("< frame exceeded maximum length: {}", String::from_utf8_lossy(&bytes));
                Received::Raw { bytes, error: None }
            }
        };

        for listener in self.listeners.snapshot() {
            listener.on_receive(&received);
        }
    }

    pub(crate) fn base(&self) -> NumberBase {
        self.base
    }

    pub(crate) fn record_sent(&self) {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        // Saturating: the count is advisory and must not wrap.
        let _ = self
            .counters
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |q| q.checked_sub(1));
    }

    pub(crate) fn stats(&self) -> DriverStats {
        DriverStats {
            received: self.counters.received.load(Ordering::Relaxed),
            unparsed: self.counters.unparsed.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// The tasks bound to one open connection.
struct Session {
    port: String,
    shutdown: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Session {
    /// Signals both tasks, waits for them, and aborts whichever overruns.
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        for (name, mut handle) in [("reader", self.reader), ("writer", self.writer)] {
            if tokio::time::timeout(TEARDOWN_TIMEOUT, &mut handle).await.is_err() {
                warn!(port = %self.port, "{name} did not stop in time; aborting");
                handle.abort();
            }
        }
        debug!(port = %self.port, "session stopped");
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// A CBUS driver over any [`Transport`].
pub struct Driver {
    transport: Arc<dyn Transport>,
    options: DriverOptions,
    shared: Arc<DriverShared>,
    outbound_tx: mpsc::UnboundedSender<Event>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<Event>>>,
    session: Mutex<Option<Session>>,
    port_name: StdMutex<Option<String>>,
}

impl Driver {
    /// Creates a disconnected driver.
    pub fn new(transport: Arc<dyn Transport>, options: DriverOptions) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            shared: Arc::new(DriverShared::new(options.base)),
            options,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            session: Mutex::new(None),
            port_name: StdMutex::new(None),
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// The port of the current connection, if one was opened.
    pub fn port_name(&self) -> Option<String> {
        self.port_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> DriverStats {
        self.shared.stats()
    }

    fn set_port_name(&self, name: Option<String>) {
        *self.port_name.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }
}

#[async_trait]
impl BusDriver for Driver {
    async fn connect(&self, name: &str) -> Result<(), DriverError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!(port = %previous.port, "closing previous connection");
            previous.stop().await;
        }
        self.set_port_name(None);

        let connection = match self.transport.open(name).await {
            Ok(c) => c,
            Err(source) => {
                warn!(transport = self.transport.kind(), port = name, "connect failed: {source}");
                self.shared.comms.set(CommsState::Disconnected);
                return Err(DriverError::Connect {
                    name: name.to_string(),
                    source,
                });
            }
        };

        // CONNECTED before the tasks start, so an immediate EOF still ends DISCONNECTED.
        self.shared.comms.set(CommsState::Connected);
        self.set_port_name(Some(name.to_string()));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let reader = tokio::spawn(run_reader(
            connection.reader,
            shutdown_rx.clone(),
            Arc::clone(&self.shared),
        ));
        let writer = tokio::spawn(run_writer(
            connection.writer,
            Arc::clone(&self.outbound_rx),
            shutdown_rx,
            Arc::clone(&self.shared),
            self.options.write_delay,
        ));

        info!(transport = self.transport.kind(), port = name, "connected");
        *session = Some(Session {
            port: name.to_string(),
            shutdown,
            reader,
            writer,
        });
        Ok(())
    }

    async fn close(&self) {
        if let Some(previous) = self.session.lock().await.take() {
            info!(port = %previous.port, "closing connection");
            previous.stop().await;
        }
        self.set_port_name(None);
        self.shared.comms.set(CommsState::Disconnected);
    }

    fn send(&self, event: Event) {
        if self.shared.comms.current() != CommsState::Connected {
            self.shared.record_dropped();
            warn!("not connected; dropping {}", dump(&event, self.shared.base()));
            return;
        }
        self.shared.record_enqueued();
        if self.outbound_tx.send(event).is_err() {
            // The receiver lives as long as the driver; unreachable in practice.
            self.shared.record_dequeued();
            self.shared.record_dropped();
        }
    }

    fn add_listener(&self, listener: Arc<dyn ReceiveListener>) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    fn comms_state(&self) -> CommsState {
        self.shared.comms.current()
    }

    fn subscribe_comms_state(&self, listener: Arc<dyn CommsListener>) -> ListenerId {
        self.shared.comms.subscribe(listener)
    }

    fn unsubscribe_comms_state(&self, id: ListenerId) -> bool {
        self.shared.comms.unsubscribe(id)
    }

    fn available_ports(&self) -> Vec<String> {
        self.transport.available_ports()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
