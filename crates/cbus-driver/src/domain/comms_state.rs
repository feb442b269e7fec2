//! Connection state of one driver and the machine that guards its transitions.
//!
//! There are exactly two states.  The machine's only job is to make sure a
//! subscriber hears about every *change* exactly once: setting the state it
//! already has is silently ignored, and two units racing to set DISCONNECTED
//! (the Reader hitting EOF while `close` runs, say) produce one notification.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::listeners::{CommsListener, ListenerId, ListenerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommsState {
    Disconnected,
    Connected,
}

impl CommsState {
    fn as_u8(self) -> u8 {
        match self {
            CommsState::Disconnected => 0,
            CommsState::Connected => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        if raw == 1 {
            CommsState::Connected
        } else {
            CommsState::Disconnected
        }
    }
}

impl fmt::Display for CommsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsState::Disconnected => f.write_str("DISCONNECTED"),
            CommsState::Connected => f.write_str("CONNECTED"),
        }
    }
}

/// Holds the current [`CommsState`] and notifies subscribers on change.
///
/// The state itself is an atomic so [`CommsStateMachine::current`] never
/// blocks, even from inside a subscriber callback.  Transitions are
/// serialised by a separate mutex that is held while subscribers run.
pub struct CommsStateMachine {
    state: AtomicU8,
    transition: Mutex<()>,
    subscribers: ListenerRegistry<dyn CommsListener>,
}

impl CommsStateMachine {
    /// Starts in [`CommsState::Disconnected`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CommsState::Disconnected.as_u8()),
            transition: Mutex::new(()),
            subscribers: ListenerRegistry::new(),
        }
    }

    pub fn current(&self) -> CommsState {
        CommsState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `new`, notifying every subscriber if the value changed.
    ///
    /// Returns `true` when a transition happened.
    pub fn set(&self, new: CommsState) -> bool {
        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let old = CommsState::from_u8(self.state.swap(new.as_u8(), Ordering::AcqRel));
        if old == new {
            return false;
        }

        info!(from = %old, to = %new, "comms state changed");
        for subscriber in self.subscribers.snapshot() {
            subscriber.on_state_change(new);
        }
        true
    }

    pub fn subscribe(&self, listener: Arc<dyn CommsListener>) -> ListenerId {
        self.subscribers.add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.subscribers.remove(id)
    }
}

impl Default for CommsStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<CommsState>>>, Arc<dyn CommsListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn CommsListener> = Arc::new(move |s: CommsState| {
            sink.lock().unwrap().push(s);
        });
        (seen, listener)
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        assert_eq!(CommsStateMachine::new().current(), CommsState::Disconnected);
    }

    #[test]
    fn test_notifies_once_per_change_and_never_for_same_state() {
        // Arrange
        let machine = CommsStateMachine::new();
        let (seen, listener) = recorder();
        machine.subscribe(listener);

        // Act
        assert!(!machine.set(CommsState::Disconnected));
        assert!(machine.set(CommsState::Connected));
        assert!(!machine.set(CommsState::Connected));
        assert!(machine.set(CommsState::Disconnected));
        assert!(!machine.set(CommsState::Disconnected));

        // Assert
        assert_eq!(
            *seen.lock().unwrap(),
            vec![CommsState::Connected, CommsState::Disconnected]
        );
    }

    #[test]
    fn test_subscriber_may_read_current_state_during_notification() {
        let machine = Arc::new(CommsStateMachine::new());
        let observed = Arc::new(Mutex::new(None));
        let m = Arc::clone(&machine);
        let o = Arc::clone(&observed);
        machine.subscribe(Arc::new(move |_: CommsState| {
            *o.lock().unwrap() = Some(m.current());
        }));

        machine.set(CommsState::Connected);

        assert_eq!(*observed.lock().unwrap(), Some(CommsState::Connected));
    }

    #[test]
    fn test_concurrent_disconnects_notify_once() {
        // Arrange
        let machine = Arc::new(CommsStateMachine::new());
        machine.set(CommsState::Connected);
        let (seen, listener) = recorder();
        machine.subscribe(listener);

        // Act
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&machine);
                std::thread::spawn(move || m.set(CommsState::Disconnected))
            })
            .collect();
        let transitions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();

        // Assert
        assert_eq!(transitions, 1);
        assert_eq!(*seen.lock().unwrap(), vec![CommsState::Disconnected]);
    }

    #[test]
    fn test_unsubscribed_listener_is_not_notified() {
        let machine = CommsStateMachine::new();
        let (seen, listener) = recorder();
        let id = machine.subscribe(listener);
        assert!(machine.unsubscribe(id));

        machine.set(CommsState::Connected);

        assert!(seen.lock().unwrap().is_empty());
    }
}
