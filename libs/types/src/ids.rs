//! Identifier types for persisted events
//!
//! The feed carries a string `id` per event. Lines without one are keyed by
//! a SHA-256 digest of their canonical JSON so that re-inserting the same
//! event is still detected as a duplicate by the store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for an event document.
///
/// Used as the primary key of the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap an identifier taken from the feed.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from the canonical bytes of an event.
    pub fn from_content(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was derived from content rather than supplied by the feed.
    pub fn is_derived(&self) -> bool {
        self.0.starts_with("sha256:")
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable() {
        let a = EventId::from_content(b"{\"type\":\"PushEvent\"}");
        let b = EventId::from_content(b"{\"type\":\"PushEvent\"}");
        assert_eq!(a, b);
        assert!(a.is_derived());
        assert_eq!(a.as_str().len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_feed_id_not_derived() {
        let id = EventId::new("34567890123");
        assert!(!id.is_derived());
        assert_eq!(id.to_string(), "34567890123");
    }
}
