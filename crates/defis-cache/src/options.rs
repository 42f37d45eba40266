//! Per-call cache options.

use std::time::Duration;

/// Options accepted by `set` and `get_or_set`.
///
/// A zero TTL stores an entry that is already expired: it never produces a
/// hit, but it still shows up in tag bookkeeping until it is purged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Time to live. Falls back to the cache's default TTL when `None`.
    pub ttl: Option<Duration>,
    /// Tags used for grouped invalidation.
    pub tags: Vec<String>,
    /// Serve expired values while a single background fetch refreshes them.
    pub stale_while_revalidate: bool,
}

impl CacheOptions {
    /// Creates empty options (default TTL, no tags, blocking refresh).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds several tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Enables stale-while-revalidate.
    #[must_use]
    pub fn with_stale_while_revalidate(mut self) -> Self {
        self.stale_while_revalidate = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = CacheOptions::new()
            .with_ttl(Duration::from_secs(10))
            .with_tag("challenges")
            .with_tags(["user:1", "user:2"])
            .with_stale_while_revalidate();

        assert_eq!(options.ttl, Some(Duration::from_secs(10)));
        assert_eq!(options.tags, vec!["challenges", "user:1", "user:2"]);
        assert!(options.stale_while_revalidate);
    }

    #[test]
    fn test_default_is_blocking_without_tags() {
        let options = CacheOptions::default();
        assert_eq!(options.ttl, None);
        assert!(options.tags.is_empty());
        assert!(!options.stale_while_revalidate);
    }
}
