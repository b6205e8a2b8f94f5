//! Pubsub client facade.
//!
//! [`PubsubClient`] ties the pieces together: the reconnection controller
//! owns the transport, the registry and pending queue record what the
//! application wants, and the dispatcher runs handlers.
//!
//! # Event Loop
//!
//! ```text
//! Transport ──EventSink──► mpsc ──► event loop task
//!                                     │
//!                                     ├─ Open    → resubscribe, drain queue, on_open
//!                                     ├─ Message → parse, snapshot, dispatch
//!                                     ├─ Error   → log, on_error
//!                                     └─ Close   → schedule reconnect, on_close
//! ```
//!
//! Events are tagged with the generation of the transport that produced
//! them; events of released transports are ignored.
//!
//! # Example
//!
//! ```no_run
//! use baas_pubsub::{PubsubClient, PubsubOptions, ServiceConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = PubsubClient::new(PubsubOptions::new())?;
//!     client.configure(&ServiceConfig::new("https://api.example.com", "key"))?;
//!
//!     client.subscribe_fn("news", |event| {
//!         println!("{}: {}", event.channel, event.data);
//!     })?;
//!
//!     client.publish("news", serde_json::json!({ "title": "hello" }))?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::{DispatchMode, PubsubOptions, ServiceConfig};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::identifiers::ChannelName;
use crate::protocol::{ControlFrame, InboundEvent};
use crate::transport::{Envelope, Transport, TransportEvent, TransportFactory, WsTransportFactory};

use super::controller::{ConnectionState, Controller};
use super::dispatch::{Dispatcher, Handler, MessageHandler};
use super::listener::{ConnectionListener, ListenerSlot};
use super::queue::{PendingMessage, PendingQueue};
use super::registry::{Insertion, Removal, SubscriptionRegistry};

// ============================================================================
// Channels
// ============================================================================

/// Registry and pending queue, mutated together.
#[derive(Default)]
struct Channels {
    registry: SubscriptionRegistry<dyn MessageHandler>,
    pending: PendingQueue,
    /// Set while the pending queue is being flushed after an open.
    draining: bool,
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    controller: Arc<Controller>,
    channels: Mutex<Channels>,
    dispatcher: Dispatcher,
    listener: ListenerSlot,
    owner: OnceLock<Weak<Container>>,
}

// ============================================================================
// PubsubClient
// ============================================================================

/// Channel-based publish/subscribe client.
///
/// Cheap to clone; clones share one connection. Dropping the last clone
/// closes the connection and stops reconnecting.
#[derive(Clone)]
pub struct PubsubClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (channels, pending) = {
            let channels = self.inner.channels.lock();
            (channels.registry.channel_count(), channels.pending.len())
        };

        f.debug_struct("PubsubClient")
            .field("state", &self.state())
            .field("uri", &self.uri())
            .field("channels", &channels)
            .field("pending", &pending)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PubsubClient - Constructors
// ============================================================================

impl PubsubClient {
    /// Creates a client using WebSocket transports.
    ///
    /// The client stays disconnected until [`PubsubClient::configure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a Tokio runtime.
    pub fn new(options: PubsubOptions) -> Result<Self> {
        let factory = WsTransportFactory::new()?;
        Self::with_transport(options, Arc::new(factory))
    }

    /// Creates a client with a custom transport factory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a Tokio runtime, or if
    /// the dispatch thread cannot be started.
    pub fn with_transport(
        options: PubsubOptions,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("pubsub client requires a Tokio runtime"))?;

        let dispatcher = Dispatcher::new(options.dispatch, runtime.clone())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Controller::new(options, factory, runtime.clone(), events_tx);

        let inner = Arc::new(Inner {
            controller,
            channels: Mutex::new(Channels::default()),
            dispatcher,
            listener: ListenerSlot::default(),
            owner: OnceLock::new(),
        });

        runtime.spawn(run_event_loop(Arc::downgrade(&inner), events_rx));
        debug!("Pubsub client created");

        Ok(Self { inner })
    }

    /// Records the container this client belongs to.
    pub(crate) fn attach_owner(&self, owner: Weak<Container>) {
        if self.inner.owner.set(owner).is_err() {
            debug!("Pubsub client already has an owner");
        }
    }
}

// ============================================================================
// PubsubClient - Connection
// ============================================================================

impl PubsubClient {
    /// Derives the pubsub URI from `config` and connects to it.
    ///
    /// Any current connection is discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the endpoint is unusable
    /// - [`Error::ClientClosed`] after [`PubsubClient::close`]
    pub fn configure(&self, config: &ServiceConfig) -> Result<()> {
        let uri = config.pubsub_uri()?;

        if config.dispatch != self.dispatch_mode() {
            debug!(
                requested = ?config.dispatch,
                active = ?self.dispatch_mode(),
                "Dispatch mode is fixed at construction"
            );
        }

        self.inner.controller.connect_to(uri)
    }

    /// Re-reads the configuration of the owning container and reconnects.
    ///
    /// # Errors
    ///
    /// - [`Error::OwnerReleased`] if the client has no live owner
    /// - anything [`PubsubClient::configure`] returns
    pub fn reconfigure(&self) -> Result<()> {
        let owner = self
            .inner
            .owner
            .get()
            .and_then(Weak::upgrade)
            .ok_or(Error::OwnerReleased)?;

        self.configure(&owner.config())
    }

    /// Connects to the configured URI and resets the retry counter.
    ///
    /// An open connection is kept. While a handshake is in flight the
    /// reconnect timer is re-armed instead of starting a second one.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConfigured`] before the first [`PubsubClient::configure`]
    /// - [`Error::ClientClosed`] after [`PubsubClient::close`]
    pub fn connect(&self) -> Result<()> {
        self.inner.controller.connect()
    }

    /// Closes the connection and stops reconnecting, permanently.
    ///
    /// Queued publishes are kept but never sent.
    pub fn close(&self) {
        self.inner.controller.close();
    }

    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns `true` if a connection attempt is in flight.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.controller.state()
    }

    /// Returns `true` after [`PubsubClient::close`].
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.controller.is_closed()
    }

    /// Attempts made since the last open or [`PubsubClient::connect`].
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.controller.retries()
    }

    /// Returns the pubsub URI, once configured.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> Option<String> {
        self.inner.controller.uri()
    }

    /// Returns the reconnect and dispatch settings.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &PubsubOptions {
        self.inner.controller.options()
    }

    /// Returns the handler execution context.
    #[inline]
    #[must_use]
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.dispatcher.mode()
    }

    /// Registers the connection listener, replacing any previous one.
    ///
    /// The client holds it weakly; dropping the `Arc` unregisters it.
    pub fn set_listener<L: ConnectionListener + 'static>(&self, listener: &Arc<L>) {
        self.inner.listener.set(listener);
    }

    /// Unregisters the connection listener.
    pub fn clear_listener(&self) {
        self.inner.listener.clear();
    }

    /// Returns `true` if a live listener is registered.
    #[inline]
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.inner.listener.is_set()
    }
}

// ============================================================================
// PubsubClient - Channels
// ============================================================================

impl PubsubClient {
    /// Registers `handler` for `channel`.
    ///
    /// The first handler of a channel sends a subscribe frame when
    /// connected; otherwise the channel is subscribed on the next open.
    /// Registering the same handler twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `channel` is blank.
    pub fn subscribe(&self, channel: impl AsRef<str>, handler: Handler) -> Result<()> {
        let channel = ChannelName::new(channel)?;
        let mut channels = self.inner.channels.lock();

        match channels.registry.insert(&channel, handler) {
            Insertion::FirstForChannel => {
                debug!(channel = %channel, "Subscribed");
                self.inner.send_control(&ControlFrame::subscribe(&channel));
            }
            Insertion::Added => trace!(channel = %channel, "Handler added"),
            Insertion::Duplicate => trace!(channel = %channel, "Handler already registered"),
        }

        Ok(())
    }

    /// Registers a closure for `channel` and returns its handle.
    ///
    /// Keep the returned [`Handler`] to unsubscribe later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `channel` is blank.
    pub fn subscribe_fn<F>(&self, channel: impl AsRef<str>, f: F) -> Result<Handler>
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(f);
        self.subscribe(channel, Arc::clone(&handler))?;
        Ok(handler)
    }

    /// Unregisters `handler` from `channel`.
    ///
    /// Returns `false` if it was not registered. Removing the last handler
    /// sends an unsubscribe frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `channel` is blank.
    pub fn unsubscribe(&self, channel: impl AsRef<str>, handler: &Handler) -> Result<bool> {
        let channel = ChannelName::new(channel)?;
        let mut channels = self.inner.channels.lock();

        match channels.registry.remove(channel.as_str(), handler) {
            Removal::NotFound => Ok(false),
            Removal::Removed => {
                trace!(channel = %channel, "Handler removed");
                Ok(true)
            }
            Removal::LastForChannel => {
                debug!(channel = %channel, "Unsubscribed");
                self.inner.send_control(&ControlFrame::unsubscribe(&channel));
                Ok(true)
            }
        }
    }

    /// Unregisters every handler of `channel` and returns them.
    ///
    /// Always sends an unsubscribe frame when connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `channel` is blank.
    pub fn unsubscribe_all(&self, channel: impl AsRef<str>) -> Result<Vec<Handler>> {
        let channel = ChannelName::new(channel)?;
        let mut channels = self.inner.channels.lock();

        let removed = channels.registry.remove_all(channel.as_str());
        debug!(channel = %channel, handlers = removed.len(), "Unsubscribed all");
        self.inner.send_control(&ControlFrame::unsubscribe(&channel));

        Ok(removed)
    }

    /// Publishes `data` to `channel`.
    ///
    /// Sent immediately when connected, otherwise queued and sent in order
    /// on the next open.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `channel` is blank or `data` is null
    /// - [`Error::ClientClosed`] after [`PubsubClient::close`]
    pub fn publish(&self, channel: impl AsRef<str>, data: impl Into<Value>) -> Result<()> {
        let channel = ChannelName::new(channel)?;
        let data = data.into();
        if data.is_null() {
            return Err(Error::invalid_argument("publish payload must not be null"));
        }
        if self.inner.controller.is_closed() {
            return Err(Error::ClientClosed);
        }

        let message = PendingMessage::new(channel, data);
        let mut channels = self.inner.channels.lock();

        if !channels.draining && channels.pending.is_empty() {
            if let Some(transport) = self.inner.controller.open_transport() {
                let sent = send_frame(transport.as_ref(), &message.to_frame());
                match sent {
                    Ok(()) => return Ok(()),
                    Err(Error::Json(e)) => return Err(Error::Json(e)),
                    Err(e) => debug!(error = %e, "Send failed, publish queued"),
                }
            }
        }

        trace!(channel = %message.channel, "Publish queued");
        channels.pending.push(message);
        Ok(())
    }

    /// Number of publishes waiting for a connection.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.channels.lock().pending.len()
    }

    /// Channels with at least one handler, sorted.
    #[must_use]
    pub fn subscribed_channels(&self) -> Vec<ChannelName> {
        let mut channels: Vec<_> = self
            .inner
            .channels
            .lock()
            .registry
            .channels()
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    /// Number of handlers registered for `channel`.
    #[inline]
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.inner.channels.lock().registry.handler_count(channel.trim())
    }
}

// ============================================================================
// Inner - Event Handling
// ============================================================================

impl Inner {
    fn handle_event(&self, envelope: Envelope) {
        let Envelope { generation, event } = envelope;

        match event {
            TransportEvent::Open {
                status_code,
                status_message,
            } => self.handle_open(generation, status_code, &status_message),

            TransportEvent::Message(text) => {
                if self.controller.is_current(generation) {
                    self.handle_message(&text);
                } else {
                    trace!(generation, "Message from released transport ignored");
                }
            }

            TransportEvent::Error(error) => {
                if self.controller.is_current(generation) {
                    warn!(generation, error = %error, "Transport error");
                    self.listener.notify_error(&error);
                } else {
                    trace!(generation, error = %error, "Error from released transport ignored");
                }
            }

            TransportEvent::Close { reason } => {
                if self.controller.on_close(generation, &reason) {
                    self.listener.notify_close(&reason);
                } else {
                    trace!(generation, reason = %reason, "Close from released transport ignored");
                }
            }
        }
    }

    fn handle_open(&self, generation: u64, status_code: u16, status_message: &str) {
        let transport = {
            let mut channels = self.channels.lock();
            let Some(transport) = self.controller.on_open(generation) else {
                trace!(generation, "Open from released transport ignored");
                return;
            };

            info!(generation, status_code, status_message, "Pubsub connection open");

            channels.draining = true;
            for channel in channels.registry.channels() {
                if let Err(e) = send_frame(transport.as_ref(), &ControlFrame::subscribe(channel)) {
                    warn!(channel = %channel, error = %e, "Resubscribe failed");
                }
            }
            transport
        };

        self.drain(transport.as_ref());
        self.listener.notify_open();
    }

    /// Flushes the pending queue, batch by batch, until it stays empty.
    fn drain(&self, transport: &dyn Transport) {
        loop {
            let mut batch = {
                let mut channels = self.channels.lock();
                if channels.pending.is_empty() {
                    channels.draining = false;
                    return;
                }
                channels.pending.take()
            };

            let total = batch.len();
            while let Some(message) = batch.pop_front() {
                let sent = send_frame(transport, &message.to_frame());
                match sent {
                    Ok(()) => {}
                    Err(Error::Json(e)) => {
                        warn!(channel = %message.channel, error = %e, "Unencodable publish dropped");
                    }
                    Err(e) => {
                        warn!(error = %e, remaining = batch.len() + 1, "Flush interrupted");
                        batch.push_front(message);
                        let mut channels = self.channels.lock();
                        channels.pending.requeue_front(batch);
                        channels.draining = false;
                        return;
                    }
                }
            }

            debug!(count = total, "Flushed pending publishes");
        }
    }

    fn handle_message(&self, text: &str) {
        let event = match InboundEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Inbound frame dropped");
                return;
            }
        };

        let handlers = self.channels.lock().registry.snapshot(event.channel.as_str());
        self.dispatcher.dispatch(event, handlers);
    }

    /// Sends a sub/unsub frame if connected. Call with the channels lock held.
    fn send_control(&self, frame: &ControlFrame<'_>) {
        let Some(transport) = self.controller.open_transport() else {
            debug!(
                action = frame.action(),
                channel = %frame.channel(),
                "Not connected, control frame deferred to next open"
            );
            return;
        };

        if let Err(e) = send_frame(transport.as_ref(), frame) {
            debug!(action = frame.action(), error = %e, "Control frame not sent");
        }
    }
}

/// Consumes transport events until the client is dropped.
async fn run_event_loop(inner: Weak<Inner>, mut events_rx: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = events_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(envelope);
    }
    debug!("Pubsub event loop terminated");
}

fn send_frame(transport: &dyn Transport, frame: &ControlFrame<'_>) -> Result<()> {
    let text = frame.to_text()?;
    trace!(action = frame.action(), channel = %frame.channel(), "Sending frame");
    transport.send(text)
}

// ============================================================================
// Tests
// ============================================================================
