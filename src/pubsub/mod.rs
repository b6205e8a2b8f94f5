//! Channel-based publish/subscribe.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`PubsubClient`] | Public facade |
//! | `controller` | Connection state machine, retries, backoff timer |
//! | [`SubscriptionRegistry`] | Channel → handler set |
//! | [`PendingQueue`] | Publishes waiting for a connection |
//! | `dispatch` | Runs handlers on the configured execution context |
//! | [`ConnectionListener`] | Lifecycle observer |

// ============================================================================
// Submodules
// ============================================================================

mod client;
mod controller;
mod dispatch;
mod listener;

/// Pending outbound queue.
pub mod queue;

/// Channel → handler registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::PubsubClient;
pub use controller::ConnectionState;
pub use dispatch::{Handler, MessageHandler};
pub use listener::ConnectionListener;
pub use queue::{PendingMessage, PendingQueue};
pub use registry::{Insertion, Removal, SubscriptionRegistry};
