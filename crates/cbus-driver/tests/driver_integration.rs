//! Integration tests for the driver over the in-memory transport.
//!
//! # Purpose
//!
//! These tests drive a real [`Driver`] (real Reader and Writer tasks, real
//! comms-state machine) through its public API, with the test playing the
//! part of the CAN interface on the far end of an in-memory pipe:
//!
//! ```text
//!   test ──send()──▶ Driver ──Writer──▶ pipe ──▶ MockPeer::read_frame
//!   test ◀─listener─ Driver ◀─Reader─── pipe ◀── MockPeer::send
//! ```
//!
//! They verify the happy path in both directions, the raw fallback for
//! undecodable frames, the disconnected-send policy, reconnects, and that
//! a peer hanging up moves the driver to DISCONNECTED.

use std::sync::Arc;
use std::time::Duration;

use cbus_core::{Event, MajorPriority, MinorPriority, Opc};
use cbus_driver::infrastructure::transport::{InMemoryTransport, MockPeer};
use cbus_driver::{BusDriver, CommsState, Driver, DriverOptions, Received};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    transport: Arc<InMemoryTransport>,
    driver: Driver,
    received: mpsc::UnboundedReceiver<Received>,
    states: mpsc::UnboundedReceiver<CommsState>,
}

fn harness() -> Harness {
    let transport = Arc::new(InMemoryTransport::new());
    let driver = Driver::new(transport.clone(), DriverOptions::default());

    let (rx_tx, received) = mpsc::unbounded_channel();
    driver.add_listener(Arc::new(move |r: &Received| {
        let _ = rx_tx.send(r.clone());
    }));
    let (st_tx, states) = mpsc::unbounded_channel();
    driver.subscribe_comms_state(Arc::new(move |s: CommsState| {
        let _ = st_tx.send(s);
    }));

    Harness {
        transport,
        driver,
        received,
        states,
    }
}

impl Harness {
    async fn connect(&mut self, name: &str) -> MockPeer {
        self.driver.connect(name).await.expect("connect");
        self.transport.take_peer().expect("peer")
    }

    async fn next_received(&mut self) -> Received {
        timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("listener channel closed")
    }

    async fn next_state(&mut self) -> CommsState {
        timeout(WAIT, self.states.recv())
            .await
            .expect("timed out waiting for a state change")
            .expect("state channel closed")
    }
}

fn acon_1_2() -> Event {
    Event::new(Opc::Acon)
        .with_priority(MajorPriority::High, MinorPriority::High)
        .with_can_id(5)
        .with_node_number(1)
        .with_event_number(2)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_notifies_connected_once() {
    let mut h = harness();

    let _peer = h.connect("mock0").await;

    assert_eq!(h.next_state().await, CommsState::Connected);
    assert_eq!(h.driver.comms_state(), CommsState::Connected);
    assert_eq!(h.driver.port_name().as_deref(), Some("mock0"));
    assert!(h.states.try_recv().is_err(), "no redundant notification");
}

#[tokio::test]
async fn test_inbound_frame_reaches_listener_as_event() {
    // Arrange
    let mut h = harness();
    let mut peer = h.connect("mock0").await;

    // Act: noise before the frame and a frame split over two writes.
    peer.send("\r\n:S10A0N900001").await.unwrap();
    peer.send("0002;").await.unwrap();

    // Assert
    match h.next_received().await {
        Received::Event { event, frame } => {
            assert_eq!(frame, b":S10A0N9000010002;");
            assert_eq!(event, acon_1_2());
        }
        other => panic!("expected a decoded event, got {other:?}"),
    }
    assert_eq!(h.driver.stats().received, 1);
}

#[tokio::test]
async fn test_malformed_frame_is_delivered_raw() {
    let mut h = harness();
    let mut peer = h.connect("mock0").await;

    peer.send(":S10A0X9000010002;").await.unwrap();

    match h.next_received().await {
        Received::Raw { bytes, error } => {
            assert_eq!(bytes, b":S10A0X9000010002;");
            assert!(error.is_some());
        }
        other => panic!("expected raw text, got {other:?}"),
    }
    assert_eq!(h.driver.stats().unparsed, 1);
}

#[tokio::test]
async fn test_non_ascii_frame_reaches_listener_byte_identical() {
    // Arrange
    let mut h = harness();
    let mut peer = h.connect("mock0").await;
    let wire: &[u8] = b":S\xC3\xBF;";

    // Act
    peer.send(wire).await.unwrap();

    // Assert
    let received = h.next_received().await;
    assert!(received.event().is_none());
    assert_eq!(received.frame(), wire);
}

#[tokio::test]
async fn test_sent_event_is_written_to_transport() {
    let mut h = harness();
    let mut peer = h.connect("mock0").await;

    h.driver.send(acon_1_2());
    h.driver.send(Event::new(Opc::Qnn));

    let first = timeout(WAIT, peer.read_frame()).await.unwrap().unwrap();
    let second = timeout(WAIT, peer.read_frame()).await.unwrap().unwrap();
    assert_eq!(first, ":S10A0N9000010002;");
    assert_eq!(second, ":SB000N0D;");
}

#[tokio::test]
async fn test_send_while_disconnected_returns_immediately_and_is_not_transmitted() {
    // Arrange
    let mut h = harness();

    // Act: nothing is connected, so this must not block or fail.
    h.driver.send(acon_1_2());
    let mut peer = h.connect("mock0").await;
    h.driver.send(Event::new(Opc::Qnn));

    // Assert: only the event sent after connecting arrives.
    let frame = timeout(WAIT, peer.read_frame()).await.unwrap().unwrap();
    assert_eq!(frame, ":SB000N0D;");
    let stats = h.driver.stats();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.sent, 1);
}

#[tokio::test]
async fn test_peer_hang_up_moves_driver_to_disconnected() {
    let mut h = harness();
    let peer = h.connect("mock0").await;
    assert_eq!(h.next_state().await, CommsState::Connected);

    peer.hang_up().await.unwrap();

    assert_eq!(h.next_state().await, CommsState::Disconnected);
    assert_eq!(h.driver.comms_state(), CommsState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    // Arrange
    let mut h = harness();
    let _old = h.connect("mock0").await;
    assert_eq!(h.next_state().await, CommsState::Connected);

    // Act
    let mut new = h.connect("mock1").await;

    // Assert: the old session went down before the new one came up.
    assert_eq!(h.next_state().await, CommsState::Disconnected);
    assert_eq!(h.next_state().await, CommsState::Connected);
    assert_eq!(h.driver.port_name().as_deref(), Some("mock1"));
    assert_eq!(h.transport.opened(), vec!["mock0".to_string(), "mock1".to_string()]);

    h.driver.send(acon_1_2());
    let frame = timeout(WAIT, new.read_frame()).await.unwrap().unwrap();
    assert_eq!(frame, ":S10A0N9000010002;");
}

#[tokio::test]
async fn test_close_disconnects_and_clears_port() {
    let mut h = harness();
    let _peer = h.connect("mock0").await;
    assert_eq!(h.next_state().await, CommsState::Connected);

    h.driver.close().await;

    assert_eq!(h.next_state().await, CommsState::Disconnected);
    assert_eq!(h.driver.port_name(), None);
}

#[tokio::test]
async fn test_connect_failure_leaves_driver_disconnected() {
    let h = harness();
    h.transport.fail_next_open();

    let result = h.driver.connect("mock0").await;

    assert!(result.is_err());
    assert_eq!(h.driver.comms_state(), CommsState::Disconnected);
    assert!(h.transport.take_peer().is_none());
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    // Arrange
    let mut h = harness();
    let (tx, mut extra) = mpsc::unbounded_channel();
    let id = h.driver.add_listener(Arc::new(move |r: &Received| {
        let _ = tx.send(r.frame().to_vec());
    }));
    let mut peer = h.connect("mock0").await;

    // Act
    peer.send(":SB020N0D;").await.unwrap();
    h.next_received().await;
    assert!(h.driver.remove_listener(id));
    peer.send(":SB020N0D;").await.unwrap();
    h.next_received().await;

    // Assert
    assert_eq!(extra.recv().await.as_deref(), Some(&b":SB020N0D;"[..]));
    assert!(extra.try_recv().is_err());
}
