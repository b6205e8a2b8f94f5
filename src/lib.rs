//! BaaS Pubsub - Reconnecting publish/subscribe client.
//!
//! This library provides the realtime channel client of a backend-as-a-service
//! SDK: subscribe handlers to named channels, publish JSON payloads, and keep
//! the connection alive across network failures.
//!
//! # Architecture
//!
//! The client follows an event-driven model:
//!
//! - **Transport**: one WebSocket per connection attempt, reporting events
//!   through an [`EventSink`]
//! - **Event loop**: one Tokio task serializing open/close/message handling
//! - **Dispatch**: handlers run off the event loop, on a dedicated thread or
//!   the blocking pool
//!
//! Key design principles:
//!
//! - The subscription registry is authoritative; every channel in it is
//!   resubscribed on each open
//! - Publishes made while disconnected are queued and flushed in order
//! - Transport failures never surface to `publish`/`subscribe` callers; they
//!   go to the log and the [`ConnectionListener`]
//!
//! # Quick Start
//!
//! ```no_run
//! use baas_pubsub::{Container, ServiceConfig, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let container = Container::new(ServiceConfig::new("https://api.example.com", "my-key"))?;
//!     container.connect()?;
//!
//!     let pubsub = container.pubsub();
//!     let handler = pubsub.subscribe_fn("chat", |event| {
//!         println!("{}: {}", event.channel, event.data);
//!     })?;
//!
//!     pubsub.publish("chat", json!({ "text": "hello" }))?;
//!     pubsub.unsubscribe("chat", &handler)?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`ServiceConfig`] and [`PubsubOptions`] |
//! | [`container`] | [`Container`] owning configuration and services |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`ChannelName`] |
//! | [`protocol`] | Wire message types |
//! | [`pubsub`] | [`PubsubClient`], registry, queue, dispatch |
//! | [`transport`] | Transport contract and WebSocket implementation |

// ============================================================================
// Modules
// ============================================================================

/// Service configuration and client options.
pub mod config;

/// Owner of configuration and services.
pub mod container;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Validated identifiers.
pub mod identifiers;

/// Pubsub wire protocol message types.
pub mod protocol;

/// Channel-based publish/subscribe.
///
/// - [`PubsubClient`] - Public facade
/// - [`SubscriptionRegistry`] - Channel → handler set
/// - [`PendingQueue`] - Publishes waiting for a connection
pub mod pubsub;

/// Transport layer.
///
/// The [`Transport`] contract plus the default WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{
    DEFAULT_MIN_RECONNECT_INTERVAL, DEFAULT_RECONNECT_INTERVAL, DispatchMode, PubsubOptions,
    ServiceConfig,
};

// Container
pub use container::Container;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ChannelName;

// Protocol types
pub use protocol::{ControlFrame, InboundEvent};

// Pubsub types
pub use pubsub::{
    ConnectionListener, ConnectionState, Handler, MessageHandler, PendingMessage, PendingQueue,
    PubsubClient, SubscriptionRegistry,
};

// Transport types
pub use transport::{
    EventSink, Transport, TransportEvent, TransportFactory, WsTransport, WsTransportFactory,
};
