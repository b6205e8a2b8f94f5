//! Client configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ServiceConfig`] | Endpoint, API key and dispatch selector of a service |
//! | [`PubsubOptions`] | Reconnect policy and dispatch mode of a client |
//! | [`DispatchMode`] | Execution context for handlers |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect and dispatch options.
pub mod options;

/// Service endpoint configuration.
pub mod service;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{
    DEFAULT_MIN_RECONNECT_INTERVAL, DEFAULT_RECONNECT_INTERVAL, DispatchMode, PubsubOptions,
};
pub use service::ServiceConfig;
