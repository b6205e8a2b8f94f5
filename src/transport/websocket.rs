//! WebSocket client transport.
//!
//! [`WsTransport`] connects with `tokio-tungstenite` and spawns one tokio
//! task per connection that handles:
//!
//! - The client handshake (bounded by a connect timeout)
//! - Incoming text frames, forwarded to the [`EventSink`]
//! - Outgoing frames queued by [`Transport::send`]
//! - Close requests from the client
//!
//! Binary, ping and pong frames are ignored; tungstenite answers pings on
//! its own.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

use super::{EventSink, Transport, TransportFactory};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time for TCP connect plus WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const STATE_IDLE: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_OPEN: u8 = 2;
const STATE_CLOSED: u8 = 3;

// ============================================================================
// WsCommand
// ============================================================================

/// Internal commands for the connection task.
enum WsCommand {
    /// Write a text frame.
    Send(String),
    /// Close the connection.
    Close,
}

// ============================================================================
// CloseGuard
// ============================================================================

/// Reports the end of a connection task.
///
/// Dropped on every exit of the task, including a panic or the runtime
/// shutting down. A missing `reason` means the task did not finish on its
/// own, which is reported as an error before the close.
struct CloseGuard {
    events: EventSink,
    state: Arc<AtomicU8>,
    reason: Option<String>,
}

impl CloseGuard {
    fn new(events: EventSink, state: Arc<AtomicU8>) -> Self {
        Self {
            events,
            state,
            reason: None,
        }
    }

    fn finish(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);

        let reason = match self.reason.take() {
            Some(reason) => reason,
            None => {
                error!(generation = self.events.generation(), "Connection task aborted");
                self.events.error(Error::connection("connection task aborted"));
                "connection task aborted".to_owned()
            }
        };

        self.events.close(reason);
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// Single-use WebSocket connection.
///
/// # Thread Safety
///
/// `WsTransport` is `Send + Sync`. All operations are non-blocking; frames
/// are written by the connection task in the order `send` was called.
pub struct WsTransport {
    /// Target URI.
    uri: String,
    /// Runtime the connection task is spawned on.
    runtime: Handle,
    /// Event reporting.
    events: EventSink,
    /// Lifecycle state (shared with the connection task).
    state: Arc<AtomicU8>,
    /// Channel for sending commands to the connection task.
    command_tx: mpsc::UnboundedSender<WsCommand>,
    /// Receiver end, taken by the task on `connect`.
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<WsCommand>>>,
}

impl WsTransport {
    /// Creates an unconnected transport.
    #[must_use]
    pub fn new(uri: impl Into<String>, runtime: Handle, events: EventSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            uri: uri.into(),
            runtime,
            events,
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    /// Returns the target URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Connection task: handshake, then pump frames until closed.
    async fn run(
        uri: String,
        events: EventSink,
        state: Arc<AtomicU8>,
        mut command_rx: mpsc::UnboundedReceiver<WsCommand>,
    ) {
        let generation = events.generation();
        let mut guard = CloseGuard::new(events.clone(), Arc::clone(&state));

        // Only Close (or a dropped handle) can arrive before open; send()
        // is rejected until then.
        let connected = tokio::select! {
            result = timeout(CONNECT_TIMEOUT, connect_async(uri.as_str())) => result,
            _ = command_rx.recv() => {
                debug!(generation, "Transport closed before handshake completed");
                guard.finish("closed before open");
                return;
            }
        };

        let ws_stream = match connected {
            Ok(Ok((stream, response))) => {
                state.store(STATE_OPEN, Ordering::SeqCst);
                let status = response.status();
                debug!(generation, status = status.as_u16(), "WebSocket handshake completed");
                events.open(status.as_u16(), status.canonical_reason().unwrap_or_default());
                stream
            }
            Ok(Err(e)) => {
                warn!(generation, error = %e, "WebSocket connect failed");
                events.error(Error::WebSocket(e));
                guard.finish("connect failed");
                return;
            }
            Err(_) => {
                warn!(generation, "WebSocket connect timed out");
                events.error(Error::connection_timeout(CONNECT_TIMEOUT.as_millis() as u64));
                guard.finish("connect timed out");
                return;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                // Incoming frames from server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            events.message(text.as_str());
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(generation, "WebSocket closed by remote");
                            break frame
                                .map(|f| f.reason.as_str().to_owned())
                                .filter(|reason| !reason.is_empty())
                                .unwrap_or_else(|| "closed by remote".to_owned());
                        }

                        Some(Err(e)) => {
                            error!(generation, error = %e, "WebSocket error");
                            events.error(Error::WebSocket(e));
                            break "websocket error".to_owned();
                        }

                        None => {
                            debug!(generation, "WebSocket stream ended");
                            break "stream ended".to_owned();
                        }

                        // Ignore Binary, Ping, Pong, Frame
                        _ => {}
                    }
                }

                // Commands from the client
                command = command_rx.recv() => {
                    match command {
                        Some(WsCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(generation, error = %e, "Failed to send frame");
                                events.error(Error::WebSocket(e));
                                break "send failed".to_owned();
                            }
                            trace!(generation, "Frame sent");
                        }

                        Some(WsCommand::Close) | None => {
                            debug!(generation, "Closing WebSocket");
                            let _ = ws_write.close().await;
                            break "closed by client".to_owned();
                        }
                    }
                }
            }
        };

        // Later sends fail with ConnectionClosed instead of vanishing.
        command_rx.close();
        let mut dropped = 0usize;
        while let Ok(command) = command_rx.try_recv() {
            if matches!(command, WsCommand::Send(_)) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(generation, dropped, "Frames queued after the connection ended were dropped");
        }

        guard.finish(reason);
        debug!(generation, "Connection task terminated");
    }
}

impl Transport for WsTransport {
    fn connect(&self) {
        if self
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_CONNECTING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            warn!(uri = %self.uri, "Transport already used, ignoring connect");
            return;
        }

        let Some(command_rx) = self.command_rx.lock().take() else {
            return;
        };

        debug!(uri = %self.uri, generation = self.events.generation(), "Connecting WebSocket");

        self.runtime.spawn(Self::run(
            self.uri.clone(),
            self.events.clone(),
            Arc::clone(&self.state),
            command_rx,
        ));
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::TransportNotReady);
        }

        self.command_tx
            .send(WsCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_OPEN
    }

    #[inline]
    fn is_connecting(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CONNECTING
    }

    fn close(&self) {
        // Never connected: nothing runs, just retire the transport.
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return;
        }

        let _ = self.command_tx.send(WsCommand::Close);
    }
}

// ============================================================================
// WsTransportFactory
// ============================================================================

/// Default [`TransportFactory`] producing [`WsTransport`]s.
#[derive(Debug, Clone)]
pub struct WsTransportFactory {
    runtime: Handle,
}

impl WsTransportFactory {
    /// Creates a factory bound to the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a Tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("WebSocket transport requires a Tokio runtime"))?;
        Ok(Self::with_runtime(runtime))
    }

    /// Creates a factory spawning on `runtime`.
    #[inline]
    #[must_use]
    pub fn with_runtime(runtime: Handle) -> Self {
        install_crypto_provider();
        Self { runtime }
    }
}

/// Makes `ring` the process-wide rustls provider for `wss` handshakes.
///
/// Leaves an already installed provider in place.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(&self, uri: &str, events: EventSink) -> Arc<dyn Transport> {
        Arc::new(WsTransport::new(uri, self.runtime.clone(), events))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::TransportEvent;

    #[test]
    fn test_constants() {
        assert_eq!(CONNECT_TIMEOUT.as_secs(), 30);
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = WsTransport::new("ws://127.0.0.1:9", Handle::current(), EventSink::new(1, tx));

        assert!(!transport.is_open());
        assert!(!transport.is_connecting());
        assert!(matches!(
            transport.send("x".into()),
            Err(Error::TransportNotReady)
        ));
    }

    #[tokio::test]
    async fn test_close_before_connect_retires_transport() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = WsTransport::new("ws://127.0.0.1:9", Handle::current(), EventSink::new(1, tx));

        transport.close();
        transport.connect();

        assert!(!transport.is_connecting());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_send_after_task_ended_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = WsTransport::new("ws://127.0.0.1:9", Handle::current(), EventSink::new(1, tx));

        // Connection task has left its loop but not yet flipped the state.
        transport.state.store(STATE_OPEN, Ordering::SeqCst);
        let mut command_rx = transport.command_rx.lock().take().unwrap();
        command_rx.close();

        assert!(matches!(
            transport.send("x".into()),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_aborted_task_reports_error_then_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(STATE_OPEN));
        let guard = CloseGuard::new(EventSink::new(5, tx), Arc::clone(&state));

        let task = tokio::spawn(async move {
            let _guard = guard;
            tokio::task::yield_now().await;
            panic!("handshake blew up");
        });
        assert!(task.await.unwrap_err().is_panic());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.generation, 5);
        assert!(matches!(first.event, TransportEvent::Error(_)));

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            TransportEvent::Close { ref reason } if reason == "connection task aborted"
        ));
        assert_eq!(state.load(Ordering::SeqCst), STATE_CLOSED);
    }

    #[tokio::test]
    async fn test_finished_task_reports_close_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(STATE_OPEN));
        let mut guard = CloseGuard::new(EventSink::new(2, tx), Arc::clone(&state));

        guard.finish("closed by client");
        drop(guard);

        let only = rx.recv().await.unwrap();
        assert!(matches!(
            only.event,
            TransportEvent::Close { ref reason } if reason == "closed by client"
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(state.load(Ordering::SeqCst), STATE_CLOSED);
    }

    #[test]
    fn test_crypto_provider_is_installed() {
        install_crypto_provider();
        install_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind and drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let factory = WsTransportFactory::new().unwrap();
        let transport = factory.create(&format!("ws://127.0.0.1:{port}"), EventSink::new(3, tx));

        transport.connect();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.generation, 3);
        assert!(matches!(first.event, TransportEvent::Error(_)));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, TransportEvent::Close { .. }));
        assert!(!transport.is_open());
    }
}
