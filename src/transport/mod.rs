//! Duplex text transport.
//!
//! The pubsub client never touches sockets directly. It asks a
//! [`TransportFactory`] for a fresh [`Transport`] on every connection attempt
//! and learns about its lifecycle through the [`EventSink`] handed to the
//! factory.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐  connect()/send()/close()  ┌──────────────┐
//! │ PubsubClient │───────────────────────────►│  Transport   │
//! │  event loop  │◄───────────────────────────│ (generation) │
//! └──────────────┘   EventSink: open/message/ └──────────────┘
//!                          error/close
//! ```
//!
//! Every transport is tagged with a generation number. Events from a
//! transport that the client has already released are dropped.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` client transport |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{WsTransport, WsTransportFactory};

// ============================================================================
// Transport
// ============================================================================

/// A full-duplex text connection.
///
/// Instances are single-use: once closed, the client builds a new one.
pub trait Transport: Send + Sync {
    /// Starts connecting. Must not block; the outcome is reported through
    /// the [`EventSink`].
    fn connect(&self);

    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportNotReady`] unless the transport is open.
    fn send(&self, text: String) -> Result<()>;

    /// Returns `true` while the transport is open.
    fn is_open(&self) -> bool;

    /// Returns `true` while a connection attempt is in flight.
    fn is_connecting(&self) -> bool;

    /// Closes the transport and releases its resources.
    fn close(&self);
}

/// Builds one [`Transport`] per connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Creates an unconnected transport for `uri` reporting to `events`.
    fn create(&self, uri: &str, events: EventSink) -> Arc<dyn Transport>;
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle and data events reported by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection established.
    Open {
        /// Handshake status code.
        status_code: u16,
        /// Handshake status text.
        status_message: String,
    },

    /// Text frame received.
    Message(String),

    /// Transport-level failure. A `Close` follows when the failure is fatal.
    Error(Error),

    /// Connection closed or failed to open.
    Close {
        /// Human-readable close reason.
        reason: String,
    },
}

/// A [`TransportEvent`] tagged with the generation of its transport.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

// ============================================================================
// EventSink
// ============================================================================

/// Reporting handle given to a transport at construction.
///
/// Cheap to clone; sending never blocks.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    /// Returns the generation of the transport owning this sink.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports a successful open.
    pub fn open(&self, status_code: u16, status_message: impl Into<String>) {
        self.emit(TransportEvent::Open {
            status_code,
            status_message: status_message.into(),
        });
    }

    /// Reports an inbound text frame.
    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    /// Reports a transport error.
    pub fn error(&self, error: Error) {
        self.emit(TransportEvent::Error(error));
    }

    /// Reports that the connection is closed.
    pub fn close(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Close {
            reason: reason.into(),
        });
    }

    fn emit(&self, event: TransportEvent) {
        let envelope = Envelope {
            generation: self.generation,
            event,
        };
        if self.tx.send(envelope).is_err() {
            trace!(generation = self.generation, "Client gone, transport event dropped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert_eq!(sink.generation(), 7);

        sink.open(101, "Switching Protocols");
        sink.message("hello");
        sink.close("bye");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation, 7);
        assert!(matches!(
            first.event,
            TransportEvent::Open { status_code: 101, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap().event,
            TransportEvent::Message(ref text) if text == "hello"
        ));
        assert!(matches!(
            rx.try_recv().unwrap().event,
            TransportEvent::Close { ref reason } if reason == "bye"
        ));
    }

    #[test]
    fn test_sink_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(1, tx);
        // Should not panic
        sink.error(Error::ConnectionClosed);
    }
}
