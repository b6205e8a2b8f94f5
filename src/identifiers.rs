//! Type-safe identifiers.
//!
//! Channel names are validated once at the public boundary and carried as
//! [`ChannelName`] afterwards, so internal code never re-checks them.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::error::{Error, Result};

// ============================================================================
// ChannelName
// ============================================================================

/// Name of a pubsub channel.
///
/// Always trimmed and never empty. Equality is exact match on the trimmed
/// form, so `" news "` and `"news"` name the same channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Creates a channel name from user input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty or whitespace.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("channel name must not be blank"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for ChannelName {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChannelName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChannelName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_trims_whitespace() {
        let name = ChannelName::new("  news \n").unwrap();
        assert_eq!(name.as_str(), "news");
        assert_eq!(name, ChannelName::new("news").unwrap());
    }

    #[test]
    fn test_rejects_blank() {
        assert!(matches!(
            ChannelName::new(""),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            ChannelName::new(" \t "),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_serializes_as_string() {
        let name = ChannelName::new("room/1").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"room/1\"");
    }

    proptest! {
        #[test]
        fn prop_surrounding_whitespace_is_ignored(
            core in "[a-z0-9/_-]{1,24}",
            left in "[ \t]{0,4}",
            right in "[ \t\n]{0,4}",
        ) {
            let padded = format!("{left}{core}{right}");
            let name = ChannelName::new(&padded).unwrap();
            prop_assert_eq!(name.as_str(), core.as_str());
        }

        #[test]
        fn prop_whitespace_only_is_rejected(blank in "[ \t\r\n]{0,8}") {
            prop_assert!(ChannelName::new(&blank).is_err());
        }
    }
}
