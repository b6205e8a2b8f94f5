//! Inbound event messages.
//!
//! Events are pushed by the server for every publish on a channel the
//! client is subscribed to.
//!
//! # Parsing rules
//!
//! | Field | Required | On failure |
//! |-------|----------|------------|
//! | `channel` | yes | whole frame rejected with [`Error::MalformedMessage`] |
//! | `data` | no | logged, delivered as `null` |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Value, from_str};
use tracing::warn;

use crate::error::{Error, Result};
use crate::identifiers::ChannelName;

// ============================================================================
// InboundEvent
// ============================================================================

/// An event delivered to handlers of a channel.
///
/// # Format
///
/// ```json
/// { "channel": "news", "data": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Channel the event was published on.
    pub channel: ChannelName,

    /// Event payload, `null` when absent or undecodable.
    pub data: Value,
}

/// Wire shape before validation. `data` stays raw so a bad payload does not
/// fail the whole frame.
#[derive(Deserialize)]
struct RawEvent<'a> {
    #[serde(default)]
    channel: Option<String>,

    #[serde(default, borrow)]
    data: Option<&'a RawValue>,
}

impl InboundEvent {
    /// Creates an event directly.
    #[inline]
    #[must_use]
    pub fn new(channel: ChannelName, data: Value) -> Self {
        Self { channel, data }
    }

    /// Parses an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] if the frame is not a JSON object
    /// or carries no usable `channel`.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawEvent<'_> = from_str(text)
            .map_err(|e| Error::malformed_message(format!("invalid frame: {e}")))?;

        let channel = raw
            .channel
            .ok_or_else(|| Error::malformed_message("missing channel"))?;
        let channel = ChannelName::new(channel)
            .map_err(|_| Error::malformed_message("blank channel"))?;

        let data = match raw.data {
            Some(raw_data) => from_str::<Value>(raw_data.get()).unwrap_or_else(|e| {
                warn!(channel = %channel, error = %e, "Undecodable event data, delivering null");
                Value::Null
            }),
            None => Value::Null,
        };

        Ok(Self { channel, data })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_full_event() {
        let event = InboundEvent::parse(r#"{"channel":"news","data":{"n":1}}"#).unwrap();
        assert_eq!(event.channel.as_str(), "news");
        assert_eq!(event.data, json!({ "n": 1 }));
    }

    #[test]
    fn test_parse_missing_data_is_null() {
        let event = InboundEvent::parse(r#"{"channel":"news"}"#).unwrap();
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn test_parse_trims_channel() {
        let event = InboundEvent::parse(r#"{"channel":"  news ","data":1}"#).unwrap();
        assert_eq!(event.channel.as_str(), "news");
        assert_eq!(event.data, json!(1));
    }

    #[test]
    fn test_parse_missing_channel() {
        let err = InboundEvent::parse(r#"{"data":{"n":1}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_parse_blank_channel() {
        let err = InboundEvent::parse(r#"{"channel":"   "}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_parse_not_json() {
        let err = InboundEvent::parse("hello").unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_parse_undecodable_data_is_null() {
        // Out of f64 range: scanned as raw JSON, rejected as a Value
        let event = InboundEvent::parse(r#"{"channel":"a","data":1e400}"#).unwrap();
        assert_eq!(event.channel.as_str(), "a");
        assert_eq!(event.data, Value::Null);
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let event = InboundEvent::parse(r#"{"channel":"a","data":"x","seq":7}"#).unwrap();
        assert_eq!(event.data, json!("x"));
    }
}
