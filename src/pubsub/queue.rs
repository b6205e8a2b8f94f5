//! Pending outbound queue.
//!
//! Publishes made while the transport is not open wait here until the next
//! open, then go out in submission order. Draining takes the whole queue at
//! once so publishes made during the drain start a fresh queue instead of
//! racing the iteration.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::mem;

use serde_json::Value;

use crate::identifiers::ChannelName;
use crate::protocol::ControlFrame;

// ============================================================================
// PendingMessage
// ============================================================================

/// A publish waiting for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    /// Target channel.
    pub channel: ChannelName,
    /// Payload.
    pub data: Value,
}

impl PendingMessage {
    /// Creates a pending message.
    #[inline]
    #[must_use]
    pub fn new(channel: ChannelName, data: Value) -> Self {
        Self { channel, data }
    }

    /// Returns the publish frame for this message.
    #[inline]
    #[must_use]
    pub fn to_frame(&self) -> ControlFrame<'_> {
        ControlFrame::publish(&self.channel, &self.data)
    }
}

// ============================================================================
// PendingQueue
// ============================================================================

/// FIFO of [`PendingMessage`]s.
#[derive(Debug, Default)]
pub struct PendingQueue {
    messages: VecDeque<PendingMessage>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    #[inline]
    pub fn push(&mut self, message: PendingMessage) {
        self.messages.push_back(message);
    }

    /// Swaps the queue out, leaving an empty one behind.
    #[inline]
    #[must_use]
    pub fn take(&mut self) -> VecDeque<PendingMessage> {
        mem::take(&mut self.messages)
    }

    /// Puts unsent messages back ahead of anything queued since `take`.
    pub fn requeue_front(&mut self, mut unsent: VecDeque<PendingMessage>) {
        unsent.append(&mut self.messages);
        self.messages = unsent;
    }

    /// Number of queued messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterates in send order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.messages.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn message(channel: &str, n: u32) -> PendingMessage {
        PendingMessage::new(ChannelName::new(channel).unwrap(), json!(n))
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingQueue::new();
        queue.push(message("c1", 1));
        queue.push(message("c2", 2));
        queue.push(message("c1", 3));

        let drained: Vec<_> = queue.take().into_iter().map(|m| m.data).collect();
        assert_eq!(drained, vec![json!(1), json!(2), json!(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_during_drain_lands_in_fresh_queue() {
        let mut queue = PendingQueue::new();
        queue.push(message("a", 1));

        let batch = queue.take();
        queue.push(message("a", 2));

        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_requeue_front_keeps_order() {
        let mut queue = PendingQueue::new();
        queue.push(message("a", 1));
        queue.push(message("a", 2));

        let mut batch = queue.take();
        batch.pop_front();
        queue.push(message("a", 3));
        queue.requeue_front(batch);

        let order: Vec<_> = queue.iter().map(|m| m.data.clone()).collect();
        assert_eq!(order, vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_to_frame() {
        let text = message("news", 5).to_frame().to_text().unwrap();
        assert_eq!(text, r#"{"action":"pub","channel":"news","data":5}"#);
    }
}
