//! Scripted transport for unit tests.
//!
//! Tests drive the remote side by hand: [`MockTransport::accept`],
//! [`MockTransport::drop_connection`], [`MockTransport::receive`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{EventSink, Transport, TransportFactory};

// ============================================================================
// MockTransport
// ============================================================================

pub(crate) struct MockTransport {
    uri: String,
    events: EventSink,
    open: AtomicBool,
    connecting: AtomicBool,
    closed: AtomicBool,
    connect_calls: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new(uri: &str, events: EventSink) -> Self {
        Self {
            uri: uri.to_owned(),
            events,
            open: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Completes the handshake.
    pub(crate) fn accept(&self) {
        self.connecting.store(false, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        self.events.open(101, "Switching Protocols");
    }

    /// Fails a pending connection attempt.
    pub(crate) fn refuse(&self) {
        self.connecting.store(false, Ordering::SeqCst);
        self.events.error(Error::connection("refused"));
        self.events.close("connect failed");
    }

    /// Simulates the server going away.
    pub(crate) fn drop_connection(&self, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        self.events.close(reason);
    }

    /// Delivers an inbound frame.
    pub(crate) fn receive(&self, text: &str) {
        self.events.message(text);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_values(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Sent frames with the given action, as `(channel, data)` pairs.
    pub(crate) fn sent_actions(&self, action: &str) -> Vec<(String, Value)> {
        self.sent_values()
            .into_iter()
            .filter(|frame| frame["action"] == action)
            .map(|frame| {
                (
                    frame["channel"].as_str().unwrap_or_default().to_owned(),
                    frame.get("data").cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    pub(crate) fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connecting.store(true, Ordering::SeqCst);
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::TransportNotReady);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// MockFactory
// ============================================================================

#[derive(Default)]
pub(crate) struct MockFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub(crate) fn last(&self) -> Arc<MockTransport> {
        Arc::clone(self.created.lock().last().expect("no transport created"))
    }

    pub(crate) fn get(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.created.lock()[index])
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, uri: &str, events: EventSink) -> Arc<dyn Transport> {
        let transport = Arc::new(MockTransport::new(uri, events));
        self.created.lock().push(Arc::clone(&transport));
        transport
    }
}
