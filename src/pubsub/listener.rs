//! Connection listener.
//!
//! The client keeps at most one listener and holds it weakly: the
//! application owns the listener, and must unregister it (or simply drop
//! it) when done. A dropped listener is skipped silently.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::error::Error;

// ============================================================================
// ConnectionListener
// ============================================================================

/// Observer of connection lifecycle events.
///
/// Callbacks run on the client's event loop and must not block.
pub trait ConnectionListener: Send + Sync {
    /// The connection is open and pending publishes have been flushed.
    fn on_open(&self) {}

    /// The connection closed; a reconnect is scheduled unless retries are
    /// exhausted or the client was closed.
    fn on_close(&self, reason: &str) {
        let _ = reason;
    }

    /// A transport error occurred.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

// ============================================================================
// ListenerSlot
// ============================================================================

/// Holds the registered listener, if any.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    listener: RwLock<Option<Weak<dyn ConnectionListener>>>,
}

impl ListenerSlot {
    /// Replaces the registered listener.
    pub(crate) fn set<L: ConnectionListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<L> = Arc::downgrade(listener);
        *self.listener.write() = Some(weak);
    }

    /// Unregisters the listener.
    pub(crate) fn clear(&self) {
        *self.listener.write() = None;
    }

    /// Returns `true` if a live listener is registered.
    pub(crate) fn is_set(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<dyn ConnectionListener>> {
        let listener = self.listener.read().as_ref().and_then(Weak::upgrade);
        if listener.is_none() {
            trace!("No live connection listener");
        }
        listener
    }

    pub(crate) fn notify_open(&self) {
        if let Some(listener) = self.current() {
            listener.on_open();
        }
    }

    pub(crate) fn notify_close(&self, reason: &str) {
        if let Some(listener) = self.current() {
            listener.on_close(reason);
        }
    }

    pub(crate) fn notify_error(&self, error: &Error) {
        if let Some(listener) = self.current() {
            listener.on_error(error);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl ConnectionListener for Recorder {
        fn on_open(&self) {
            self.calls.lock().push("open".into());
        }

        fn on_close(&self, reason: &str) {
            self.calls.lock().push(format!("close:{reason}"));
        }

        fn on_error(&self, error: &Error) {
            self.calls.lock().push(format!("error:{error}"));
        }
    }

    #[test]
    fn test_notifies_registered_listener() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        slot.set(&recorder);

        slot.notify_open();
        slot.notify_error(&Error::ConnectionClosed);
        slot.notify_close("bye");

        assert_eq!(
            *recorder.calls.lock(),
            vec!["open", "error:Connection closed", "close:bye"]
        );
    }

    #[test]
    fn test_listener_is_not_kept_alive() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        slot.set(&recorder);
        assert!(slot.is_set());

        drop(recorder);
        assert!(!slot.is_set());
        // Should not panic
        slot.notify_open();
    }

    #[test]
    fn test_clear() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        slot.set(&recorder);
        slot.clear();

        slot.notify_open();
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn test_default_methods_are_noops() {
        struct Silent;
        impl ConnectionListener for Silent {}

        let slot = ListenerSlot::default();
        let silent = Arc::new(Silent);
        slot.set(&silent);
        slot.notify_open();
        slot.notify_close("x");
        slot.notify_error(&Error::TransportNotReady);
    }
}
