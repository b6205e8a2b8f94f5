//! Reconnection controller.
//!
//! Owns the connection state machine, the current transport, the retry
//! counter and the backoff timer. Every mutation goes through one mutex, so
//! two reconnect attempts can never race.
//!
//! # State Machine
//!
//! ```text
//!                 connect() / timer
//!  Disconnected ─────────────────────► Connecting
//!       ▲                                  │
//!       │ close event                      │ open event
//!       │ (schedule timer)                 ▼
//!       └──────────────────────────────── Open
//! ```
//!
//! - Open resets the retry counter.
//! - Close releases the transport and arms the backoff timer, unless the
//!   retry limit is exhausted or the client was closed.
//! - A reconnect while an attempt is still in flight only re-arms the timer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::config::PubsubOptions;
use crate::error::{Error, Result};
use crate::transport::{Envelope, EventSink, Transport, TransportFactory};

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection state of a pubsub client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, or the last one closed.
    #[default]
    Disconnected,
    /// A transport is connecting.
    Connecting,
    /// The transport is open.
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        })
    }
}

// ============================================================================
// Link
// ============================================================================

/// Everything the controller mutates, behind one lock.
#[derive(Default)]
struct Link {
    state: ConnectionState,
    uri: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    generation: u64,
    retries: u32,
    timer: Option<AbortHandle>,
    closed: bool,
}

impl Link {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            trace!("Reconnect timer cancelled");
        }
    }

    fn release_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close();
            debug!(generation = self.generation, "Transport released");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.closed && self.transport.is_some() && self.generation == generation
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives the transport lifecycle for one client.
pub(crate) struct Controller {
    options: PubsubOptions,
    factory: Arc<dyn TransportFactory>,
    runtime: Handle,
    events_tx: mpsc::UnboundedSender<Envelope>,
    link: Mutex<Link>,
}

impl Controller {
    pub(crate) fn new(
        options: PubsubOptions,
        factory: Arc<dyn TransportFactory>,
        runtime: Handle,
        events_tx: mpsc::UnboundedSender<Envelope>,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            factory,
            runtime,
            events_tx,
            link: Mutex::new(Link::default()),
        })
    }

    #[inline]
    pub(crate) fn options(&self) -> &PubsubOptions {
        &self.options
    }
}

// ============================================================================
// Controller - Commands
// ============================================================================

impl Controller {
    /// Sets the target URI and starts a fresh connection to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientClosed`] after [`Controller::close`].
    pub(crate) fn connect_to(self: &Arc<Self>, uri: String) -> Result<()> {
        let mut link = self.link.lock();
        if link.closed {
            return Err(Error::ClientClosed);
        }
        link.uri = Some(uri);
        self.restart(&mut link);
        Ok(())
    }

    /// Connects to the configured URI unless already open.
    ///
    /// Resets the retry counter. While an attempt is in flight only the
    /// backoff timer is re-armed; an open connection is left alone.
    ///
    /// # Errors
    ///
    /// - [`Error::ClientClosed`] after [`Controller::close`]
    /// - [`Error::NotConfigured`] if no URI was set
    pub(crate) fn connect(self: &Arc<Self>) -> Result<()> {
        let mut link = self.link.lock();
        if link.closed {
            return Err(Error::ClientClosed);
        }
        if link.uri.is_none() {
            return Err(Error::NotConfigured);
        }
        link.retries = 0;
        self.advance(&mut link);
        Ok(())
    }

    /// Stops the timer, releases the transport, and refuses later attempts.
    pub(crate) fn close(&self) {
        let mut link = self.link.lock();
        if link.closed {
            return;
        }
        link.closed = true;
        link.cancel_timer();
        link.release_transport();
        link.state = ConnectionState::Disconnected;
        info!("Pubsub client closed");
    }

    fn restart(self: &Arc<Self>, link: &mut Link) {
        link.retries = 0;
        link.cancel_timer();
        link.release_transport();
        link.state = ConnectionState::Disconnected;
        self.attempt(link);
    }

    /// Timer entry point.
    fn reconnect(self: &Arc<Self>) {
        let mut link = self.link.lock();
        link.timer = None;

        if link.closed {
            return;
        }

        self.advance(&mut link);
    }

    /// Moves towards Open from whatever state the link is in.
    fn advance(self: &Arc<Self>, link: &mut Link) {
        match link.state {
            ConnectionState::Open => {
                trace!("Already open, reconnect skipped");
            }
            ConnectionState::Connecting
                if link.transport.as_ref().is_some_and(|t| t.is_connecting()) =>
            {
                debug!(generation = link.generation, "Attempt in flight, re-arming timer");
                self.schedule(link);
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                link.cancel_timer();
                self.attempt(link);
            }
        }
    }

    /// Builds and connects the next transport.
    fn attempt(self: &Arc<Self>, link: &mut Link) {
        if self.options.retries_exhausted(link.retries) {
            warn!(retries = link.retries, "Retry limit reached, staying disconnected");
            link.state = ConnectionState::Disconnected;
            return;
        }

        let Some(uri) = link.uri.clone() else {
            warn!("No pubsub URI configured, not connecting");
            return;
        };

        link.release_transport();
        link.retries = link.retries.saturating_add(1);
        link.generation += 1;

        let sink = EventSink::new(link.generation, self.events_tx.clone());
        let transport = self.factory.create(&uri, sink);
        link.transport = Some(Arc::clone(&transport));
        link.state = ConnectionState::Connecting;

        info!(
            generation = link.generation,
            attempt = link.retries,
            "Connecting to pubsub server"
        );

        transport.connect();
    }

    /// Arms the backoff timer, replacing any pending one.
    fn schedule(self: &Arc<Self>, link: &mut Link) {
        link.cancel_timer();

        let delay = self.options.backoff();
        let controller: Weak<Self> = Arc::downgrade(self);

        let task = self.runtime.spawn(async move {
            sleep(delay).await;
            if let Some(controller) = controller.upgrade() {
                controller.reconnect();
            }
        });

        link.timer = Some(task.abort_handle());
        debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }
}

// ============================================================================
// Controller - Transport Events
// ============================================================================

impl Controller {
    /// Returns `true` if `generation` belongs to the live transport.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.link.lock().is_current(generation)
    }

    /// Marks the connection open.
    ///
    /// Returns the transport when the event is current, `None` for events
    /// of released transports.
    pub(crate) fn on_open(&self, generation: u64) -> Option<Arc<dyn Transport>> {
        let mut link = self.link.lock();
        if !link.is_current(generation) {
            return None;
        }
        link.retries = 0;
        link.cancel_timer();
        link.state = ConnectionState::Open;
        link.transport.clone()
    }

    /// Handles the close of a transport.
    ///
    /// Returns `false` for events of released transports.
    pub(crate) fn on_close(self: &Arc<Self>, generation: u64, reason: &str) -> bool {
        let mut link = self.link.lock();
        if !link.is_current(generation) {
            return false;
        }

        link.release_transport();
        link.state = ConnectionState::Disconnected;

        if self.options.retries_exhausted(link.retries) {
            warn!(
                generation,
                retries = link.retries,
                reason,
                "Connection closed, retry limit reached"
            );
        } else {
            info!(generation, reason, "Connection closed, reconnecting");
            self.schedule(&mut link);
        }

        true
    }
}

// ============================================================================
// Controller - Queries
// ============================================================================

impl Controller {
    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Returns the transport if the connection is open.
    pub(crate) fn open_transport(&self) -> Option<Arc<dyn Transport>> {
        let link = self.link.lock();
        if link.state == ConnectionState::Open {
            link.transport.clone()
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn retries(&self) -> u32 {
        self.link.lock().retries
    }

    #[inline]
    pub(crate) fn uri(&self) -> Option<String> {
        self.link.lock().uri.clone()
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.link.lock().closed
    }

    #[cfg(test)]
    pub(crate) fn is_reconnect_scheduled(&self) -> bool {
        self.link.lock().timer.is_some()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        link.cancel_timer();
        link.release_transport();
    }
}

// ============================================================================
// Tests
// ============================================================================
