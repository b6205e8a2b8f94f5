//! Subscription registry.
//!
//! Maps each channel to the set of handlers interested in it. The registry
//! is the durable record of what the client wants: control frames may be
//! lost while disconnected, but every channel present here is resubscribed
//! on the next open.
//!
//! Handlers are compared by `Arc` identity, so the registry works for any
//! handler type, sized or not.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::identifiers::ChannelName;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of adding a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// First handler for the channel; a subscribe frame is due.
    FirstForChannel,
    /// Added next to existing handlers.
    Added,
    /// Handler was already registered for the channel.
    Duplicate,
}

/// Result of removing a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Handler was not registered for the channel.
    NotFound,
    /// Removed; other handlers remain.
    Removed,
    /// Removed the last handler; an unsubscribe frame is due.
    LastForChannel,
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Channel → handler set.
///
/// Invariant: a channel key exists only while its handler set is non-empty.
/// Handlers keep registration order, which is also delivery order in serial
/// dispatch.
pub struct SubscriptionRegistry<H: ?Sized> {
    entries: FxHashMap<ChannelName, Vec<Arc<H>>>,
}

impl<H: ?Sized> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<H: ?Sized> fmt::Debug for SubscriptionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(channel, handlers)| (channel, handlers.len())))
            .finish()
    }
}

impl<H: ?Sized> SubscriptionRegistry<H> {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `channel`.
    pub fn insert(&mut self, channel: &ChannelName, handler: Arc<H>) -> Insertion {
        match self.entries.get_mut(channel.as_str()) {
            Some(handlers) => {
                if handlers.iter().any(|h| same_handler(h, &handler)) {
                    Insertion::Duplicate
                } else {
                    handlers.push(handler);
                    Insertion::Added
                }
            }
            None => {
                self.entries.insert(channel.clone(), vec![handler]);
                Insertion::FirstForChannel
            }
        }
    }

    /// Unregisters `handler` from `channel`.
    pub fn remove(&mut self, channel: &str, handler: &Arc<H>) -> Removal {
        let Some(handlers) = self.entries.get_mut(channel) else {
            return Removal::NotFound;
        };
        let Some(index) = handlers.iter().position(|h| same_handler(h, handler)) else {
            return Removal::NotFound;
        };

        handlers.remove(index);

        if handlers.is_empty() {
            self.entries.remove(channel);
            Removal::LastForChannel
        } else {
            Removal::Removed
        }
    }

    /// Removes and returns every handler of `channel`.
    pub fn remove_all(&mut self, channel: &str) -> Vec<Arc<H>> {
        self.entries.remove(channel).unwrap_or_default()
    }

    /// Copies the current handler set of `channel`.
    ///
    /// The copy is what gets dispatched; later registry changes do not
    /// affect it.
    #[must_use]
    pub fn snapshot(&self, channel: &str) -> Vec<Arc<H>> {
        self.entries.get(channel).cloned().unwrap_or_default()
    }

    /// Returns `true` if `handler` is registered for `channel`.
    #[must_use]
    pub fn contains(&self, channel: &str, handler: &Arc<H>) -> bool {
        self.entries
            .get(channel)
            .is_some_and(|handlers| handlers.iter().any(|h| same_handler(h, handler)))
    }

    /// Number of handlers registered for `channel`.
    #[inline]
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.entries.get(channel).map_or(0, Vec::len)
    }

    /// Iterates over subscribed channels.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelName> {
        self.entries.keys()
    }

    /// Number of subscribed channels.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no channel is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity comparison, ignoring vtable metadata.
#[inline]
fn same_handler<H: ?Sized>(a: &Arc<H>, b: &Arc<H>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    trait Marker: Send + Sync {}

    struct Tag;
    impl Marker for Tag {}

    fn channel(name: &str) -> ChannelName {
        ChannelName::new(name).unwrap()
    }

    fn handler() -> Arc<dyn Marker> {
        Arc::new(Tag)
    }

    #[test]
    fn test_first_insert_reports_new_channel() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let h = handler();

        assert_eq!(registry.insert(&channel("a"), h.clone()), Insertion::FirstForChannel);
        assert!(registry.contains("a", &h));
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let h = handler();

        registry.insert(&channel("a"), h.clone());
        assert_eq!(registry.insert(&channel("a"), h.clone()), Insertion::Duplicate);
        assert_eq!(registry.handler_count("a"), 1);
    }

    #[test]
    fn test_distinct_handlers_are_added() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();

        registry.insert(&channel("a"), handler());
        assert_eq!(registry.insert(&channel("a"), handler()), Insertion::Added);
        assert_eq!(registry.handler_count("a"), 2);
    }

    #[test]
    fn test_same_handler_on_many_channels() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let h = handler();

        registry.insert(&channel("a"), h.clone());
        assert_eq!(registry.insert(&channel("b"), h.clone()), Insertion::FirstForChannel);
        assert!(registry.contains("a", &h));
        assert!(registry.contains("b", &h));
    }

    #[test]
    fn test_remove_last_drops_channel() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let first = handler();
        let second = handler();

        registry.insert(&channel("a"), first.clone());
        registry.insert(&channel("a"), second.clone());

        assert_eq!(registry.remove("a", &first), Removal::Removed);
        assert_eq!(registry.remove("a", &second), Removal::LastForChannel);
        assert!(registry.is_empty());
        assert_eq!(registry.channels().count(), 0);
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let h = handler();

        assert_eq!(registry.remove("a", &h), Removal::NotFound);

        registry.insert(&channel("a"), handler());
        assert_eq!(registry.remove("a", &h), Removal::NotFound);
        assert_eq!(registry.handler_count("a"), 1);
    }

    #[test]
    fn test_remove_all() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        registry.insert(&channel("a"), handler());
        registry.insert(&channel("a"), handler());

        assert_eq!(registry.remove_all("a").len(), 2);
        assert!(registry.remove_all("a").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        let h = handler();
        registry.insert(&channel("a"), h.clone());

        let snapshot = registry.snapshot("a");
        registry.remove("a", &h);

        assert_eq!(snapshot.len(), 1);
        assert!(registry.snapshot("a").is_empty());
    }

    #[test]
    fn test_debug_shows_counts() {
        let mut registry = SubscriptionRegistry::<dyn Marker>::new();
        registry.insert(&channel("a"), handler());
        assert_eq!(format!("{registry:?}"), r#"{ChannelName("a"): 1}"#);
    }

    proptest! {
        #[test]
        fn prop_subscribe_then_unsubscribe_is_idempotent(
            names in proptest::collection::vec("[a-c]", 1..12),
        ) {
            let mut registry = SubscriptionRegistry::<dyn Marker>::new();
            let h = handler();

            for name in &names {
                registry.insert(&channel(name), h.clone());
                prop_assert!(registry.contains(name, &h));
            }
            for name in &names {
                registry.remove(name, &h);
                prop_assert!(!registry.contains(name, &h));
                prop_assert_eq!(registry.remove(name, &h), Removal::NotFound);
            }
            prop_assert!(registry.is_empty());
        }
    }
}
