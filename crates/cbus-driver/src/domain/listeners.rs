//! Listener traits and the registry that stores them.
//!
//! # How listeners are dispatched (for beginners)
//!
//! Listeners are added and removed from application code while the Reader
//! task may be in the middle of delivering a frame.  To keep the two from
//! stepping on each other the registry never calls a listener while holding
//! its lock.  Instead every dispatch takes a *snapshot*: a cheap `Vec` of
//! `Arc` clones.  A listener registered during a dispatch therefore sees the
//! next frame, not the current one, and a listener removed during a dispatch
//! may still receive the frame that was already in flight.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cbus_core::{Event, FramingError};

use super::comms_state::CommsState;

/// Handle returned by registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// One item delivered by the Reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A frame that decoded cleanly.  `frame` holds the exact bytes read from the wire.
    Event { event: Event, frame: Vec<u8> },
    /// Bytes that could not be decoded.  `error` is `None` when the frame was
    /// cut off because it exceeded the maximum frame length.
    Raw {
        bytes: Vec<u8>,
        error: Option<FramingError>,
    },
}

impl Received {
    /// The wire bytes, whether or not they decoded.
    pub fn frame(&self) -> &[u8] {
        match self {
            Received::Event { frame, .. } => frame,
            Received::Raw { bytes, .. } => bytes,
        }
    }

    /// The wire bytes as text for logs; invalid UTF-8 is replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.frame())
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            Received::Event { event, .. } => Some(event),
            Received::Raw { .. } => None,
        }
    }
}

/// Consumer of frames read from the bus.
pub trait ReceiveListener: Send + Sync {
    fn on_receive(&self, received: &Received);
}

impl<F> ReceiveListener for F
where
    F: Fn(&Received) + Send + Sync,
{
    fn on_receive(&self, received: &Received) {
        self(received)
    }
}

/// Observer of connection state changes.
pub trait CommsListener: Send + Sync {
    fn on_state_change(&self, state: CommsState);
}

impl<F> CommsListener for F
where
    F: Fn(CommsState) + Send + Sync,
{
    fn on_state_change(&self, state: CommsState) {
        self(state)
    }
}

/// Thread-safe set of listeners with snapshot dispatch.
pub struct ListenerRegistry<L: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends `listener`; dispatch order follows registration order.
    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns `true` if `id` was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Copies the current listeners so they can be called without the lock held.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<L>)>> {
        // Listeners never run under this lock, so a poisoned guard still holds a valid Vec.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: Arc<AtomicUsize>) -> Arc<dyn ReceiveListener> {
        Arc::new(move |_: &Received| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn raw(text: &str) -> Received {
        Received::Raw {
            bytes: text.as_bytes().to_vec(),
            error: None,
        }
    }

    #[test]
    fn test_add_returns_distinct_ids() {
        let registry: ListenerRegistry<dyn ReceiveListener> = ListenerRegistry::new();
        let a = registry.add(counting_listener(Arc::new(AtomicUsize::new(0))));
        let b = registry.add(counting_listener(Arc::new(AtomicUsize::new(0))));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_unknown_id_returns_false() {
        let registry: ListenerRegistry<dyn ReceiveListener> = ListenerRegistry::new();
        let id = registry.add(counting_listener(Arc::new(AtomicUsize::new(0))));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_removal() {
        // Arrange
        let counter = Arc::new(AtomicUsize::new(0));
        let registry: ListenerRegistry<dyn ReceiveListener> = ListenerRegistry::new();
        let id = registry.add(counting_listener(Arc::clone(&counter)));

        // Act
        let snapshot = registry.snapshot();
        registry.remove(id);
        for listener in &snapshot {
            listener.on_receive(&raw(":X;"));
        }

        // Assert
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_received_frame_returns_wire_text_for_both_variants() {
        let ev = Received::Event {
            event: Event::default(),
            frame: b":SB000N0D;".to_vec(),
        };
        assert_eq!(ev.frame(), b":SB000N0D;");
        assert!(ev.event().is_some());
        assert_eq!(raw(":garbage;").frame(), b":garbage;");
        assert!(raw(":garbage;").event().is_none());
    }

    #[test]
    fn test_text_replaces_invalid_utf8_but_frame_does_not() {
        let received = Received::Raw {
            bytes: b":S\xFF;".to_vec(),
            error: None,
        };
        assert_eq!(received.frame(), b":S\xFF;");
        assert_eq!(received.text(), ":S\u{FFFD};");
    }
}
