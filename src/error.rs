//! Error types for the pubsub client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use baas_pubsub::{Error, Result};
//!
//! fn example(client: &PubsubClient) -> Result<()> {
//!     client.publish("news", serde_json::json!({ "title": "hello" }))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Caller | [`Error::InvalidArgument`], [`Error::Config`] |
//! | Lifecycle | [`Error::NotConfigured`], [`Error::ClientClosed`], [`Error::OwnerReleased`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::TransportNotReady`] |
//! | Protocol | [`Error::MalformedMessage`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// Invalid argument passed to a public entry point.
    ///
    /// Returned for blank channel names and unusable endpoints. Never retried.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// No connection URI has been derived yet.
    #[error("Pubsub client is not configured")]
    NotConfigured,

    /// The client has been closed and accepts no further connection attempts.
    #[error("Pubsub client is closed")]
    ClientClosed,

    /// The owning container was dropped before the client was used.
    #[error("Owner released")]
    OwnerReleased,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established or failed mid-stream.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send attempted while the transport is not open.
    #[error("Transport not ready")]
    TransportNotReady,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame could not be interpreted.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// Description of what is wrong with the frame.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a malformed message error.
    #[inline]
    pub fn malformed_message(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::TransportNotReady
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the client recovers from this error on its own.
    ///
    /// Recoverable errors are folded into the next reconnect and never reach
    /// `publish`/`subscribe` callers.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error() || matches!(self, Self::MalformedMessage { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::invalid_argument("channel name is blank");
        assert_eq!(err.to_string(), "Invalid argument: channel name is blank");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::TransportNotReady.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
        assert!(!Error::OwnerReleased.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(Error::malformed_message("no channel").is_recoverable());
        assert!(!Error::invalid_argument("blank").is_recoverable());
        assert!(!Error::ClientClosed.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
