//! Outbound control frames.
//!
//! Everything the client writes to the transport is one of three JSON
//! objects, discriminated by `action`.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Value, to_string};

use crate::error::Result;
use crate::identifiers::ChannelName;

// ============================================================================
// ControlFrame
// ============================================================================

/// A frame sent from the client to the pubsub server.
///
/// # Format
///
/// ```json
/// { "action": "sub",   "channel": "news" }
/// { "action": "unsub", "channel": "news" }
/// { "action": "pub",   "channel": "news", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlFrame<'a> {
    /// Start receiving events for a channel.
    Sub {
        /// Target channel.
        channel: &'a ChannelName,
    },

    /// Stop receiving events for a channel.
    Unsub {
        /// Target channel.
        channel: &'a ChannelName,
    },

    /// Publish a payload to a channel.
    Pub {
        /// Target channel.
        channel: &'a ChannelName,
        /// Payload, forwarded verbatim.
        data: &'a Value,
    },
}

impl<'a> ControlFrame<'a> {
    /// Creates a subscribe frame.
    #[inline]
    #[must_use]
    pub fn subscribe(channel: &'a ChannelName) -> Self {
        Self::Sub { channel }
    }

    /// Creates an unsubscribe frame.
    #[inline]
    #[must_use]
    pub fn unsubscribe(channel: &'a ChannelName) -> Self {
        Self::Unsub { channel }
    }

    /// Creates a publish frame.
    #[inline]
    #[must_use]
    pub fn publish(channel: &'a ChannelName, data: &'a Value) -> Self {
        Self::Pub { channel, data }
    }

    /// Returns the channel this frame targets.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        match self {
            Self::Sub { channel } | Self::Unsub { channel } | Self::Pub { channel, .. } => channel,
        }
    }

    /// Returns the wire name of the action.
    #[inline]
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Sub { .. } => "sub",
            Self::Unsub { .. } => "unsub",
            Self::Pub { .. } => "pub",
        }
    }

    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the payload cannot be serialized.
    pub fn to_text(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
