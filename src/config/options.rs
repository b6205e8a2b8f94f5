//! Pubsub client options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use baas_pubsub::{DispatchMode, PubsubOptions};
//!
//! let options = PubsubOptions::new()
//!     .with_reconnect_interval(Duration::from_secs(1))
//!     .with_retry_limit(5)
//!     .with_dispatch(DispatchMode::Background);
//!
//! assert_eq!(options.backoff(), Duration::from_secs(1));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default floor for the reconnect delay.
pub const DEFAULT_MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// DispatchMode
// ============================================================================

/// Execution context handlers run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One dedicated thread shared by all deliveries, in submission order.
    #[default]
    Serial,

    /// Every delivery on its own blocking-pool task.
    Background,
}

// ============================================================================
// PubsubOptions
// ============================================================================

/// Reconnect and dispatch settings of a [`crate::PubsubClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubsubOptions {
    /// Delay before reconnecting after a close.
    pub reconnect_interval: Duration,

    /// Lower bound applied to `reconnect_interval`.
    pub min_reconnect_interval: Duration,

    /// Maximum retries after the first attempt; `None` retries forever.
    pub retry_limit: Option<u32>,

    /// Handler execution context.
    pub dispatch: DispatchMode,
}

impl Default for PubsubOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl PubsubOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            min_reconnect_interval: DEFAULT_MIN_RECONNECT_INTERVAL,
            retry_limit: None,
            dispatch: DispatchMode::Serial,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PubsubOptions {
    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the floor for the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_min_reconnect_interval(mut self, interval: Duration) -> Self {
        self.min_reconnect_interval = interval;
        self
    }

    /// Limits retries; the client makes at most `limit + 1` attempts.
    #[inline]
    #[must_use]
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    /// Removes the retry limit.
    #[inline]
    #[must_use]
    pub fn with_unlimited_retries(mut self) -> Self {
        self.retry_limit = None;
        self
    }

    /// Sets the handler execution context.
    #[inline]
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl PubsubOptions {
    /// Returns the effective reconnect delay.
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.reconnect_interval.max(self.min_reconnect_interval)
    }

    /// Returns `true` once `retries` exceeds the configured limit.
    #[inline]
    #[must_use]
    pub fn retries_exhausted(&self, retries: u32) -> bool {
        self.retry_limit.is_some_and(|limit| retries > limit)
    }
}

// ============================================================================
// Tests
// ============================================================================
