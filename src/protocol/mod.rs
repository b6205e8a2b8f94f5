//! Pubsub wire protocol message types.
//!
//! All frames are JSON text.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`ControlFrame::Sub`] | Client → Server | Start receiving a channel |
//! | [`ControlFrame::Unsub`] | Client → Server | Stop receiving a channel |
//! | [`ControlFrame::Pub`] | Client → Server | Publish a payload |
//! | [`InboundEvent`] | Server → Client | Payload published on a channel |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound event messages.
pub mod event;

/// Outbound control frames.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::InboundEvent;
pub use frame::ControlFrame;
