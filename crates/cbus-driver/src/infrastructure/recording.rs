//! A [`BusDriver`] that records instead of talking to a bus.
//!
//! Components built on top of the driver (such as the gateway) use this in
//! their tests: frames can be injected as if the Reader had produced them
//! with [`RecordingDriver::deliver`], and everything passed to `send` is kept
//! for inspection with [`RecordingDriver::sent`].

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cbus_core::Event;

use crate::application::driver::{BusDriver, DriverError};
use crate::application::transport::TransportError;
use crate::domain::comms_state::{CommsState, CommsStateMachine};
use crate::domain::listeners::{
    CommsListener, ListenerId, ListenerRegistry, ReceiveListener, Received,
};

#[derive(Default)]
pub struct RecordingDriver {
    listeners: ListenerRegistry<dyn ReceiveListener>,
    comms: CommsStateMachine,
    sent: Mutex<Vec<Event>>,
    connects: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    ports: Vec<String>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(ports: Vec<String>) -> Self {
        Self {
            ports,
            ..Self::default()
        }
    }

    /// Makes the next `count` calls to `connect` fail.
    pub fn fail_connects(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Hands `received` to every registered listener.
    pub fn deliver(&self, received: Received) {
        for listener in self.listeners.snapshot() {
            listener.on_receive(&received);
        }
    }

    /// Forces a comms-state change, notifying subscribers.
    pub fn set_comms_state(&self, state: CommsState) -> bool {
        self.comms.set(state)
    }

    /// Every event passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<Event> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every port name passed to `connect`, including failed attempts.
    pub fn connects(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl BusDriver for RecordingDriver {
    async fn connect(&self, name: &str) -> Result<(), DriverError> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.comms.set(CommsState::Disconnected);
            return Err(DriverError::Connect {
                name: name.to_string(),
                source: TransportError::Open {
                    name: name.to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "recording driver refused"),
                },
            });
        }

        self.comms.set(CommsState::Connected);
        Ok(())
    }

    async fn close(&self) {
        self.comms.set(CommsState::Disconnected);
    }

    fn send(&self, event: Event) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn add_listener(&self, listener: Arc<dyn ReceiveListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn comms_state(&self) -> CommsState {
        self.comms.current()
    }

    fn subscribe_comms_state(&self, listener: Arc<dyn CommsListener>) -> ListenerId {
        self.comms.subscribe(listener)
    }

    fn unsubscribe_comms_state(&self, id: ListenerId) -> bool {
        self.comms.unsubscribe(id)
    }

    fn available_ports(&self) -> Vec<String> {
        self.ports.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbus_core::Opc;

    #[tokio::test]
    async fn test_failed_connects_are_counted_down() {
        let driver = RecordingDriver::new();
        driver.fail_connects(1);

        assert!(driver.connect("a").await.is_err());
        assert_eq!(driver.comms_state(), CommsState::Disconnected);
        assert!(driver.connect("a").await.is_ok());
        assert_eq!(driver.comms_state(), CommsState::Connected);
        assert_eq!(driver.connects().len(), 2);
    }

    #[test]
    fn test_deliver_reaches_listeners_and_send_is_recorded() {
        // Arrange
        let driver = RecordingDriver::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        driver.add_listener(Arc::new(move |r: &Received| {
            sink.lock().unwrap().push(r.frame().to_vec());
        }));

        // Act
        driver.deliver(Received::Raw {
            bytes: b":SB020N0D;".to_vec(),
            error: None,
        });
        driver.send(Event::new(Opc::Qnn));

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![b":SB020N0D;".to_vec()]);
        assert_eq!(driver.sent(), vec![Event::new(Opc::Qnn)]);
    }
}
