//! Stored cache entry.

use std::collections::HashSet;
use tokio::time::Instant;

/// A cached value with its expiry and tags.
///
/// `version` changes whenever the entry is replaced, so a background
/// revalidation can tell whether the entry it started from still exists.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Instant,
    pub(crate) tags: HashSet<String>,
    pub(crate) is_revalidating: bool,
    pub(crate) version: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, expires_at: Instant, tags: HashSet<String>, version: u64) -> Self {
        Self {
            value,
            expires_at,
            tags,
            is_revalidating: false,
            version,
        }
    }

    /// An entry whose expiry equals `now` is already expired, so a zero TTL
    /// never yields a hit.
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_freshness_boundary() {
        let now = Instant::now();
        let entry = CacheEntry::new(1, now + Duration::from_secs(5), HashSet::new(), 0);
        assert!(entry.is_fresh(now));
        assert!(entry.is_fresh(now + Duration::from_secs(4)));
        assert!(!entry.is_fresh(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        let now = Instant::now();
        let entry = CacheEntry::new("v", now, HashSet::new(), 0);
        assert!(!entry.is_fresh(now));
    }

    #[test]
    fn test_has_tag() {
        let tags = ["a".to_string()].into_iter().collect();
        let entry = CacheEntry::new((), Instant::now(), tags, 0);
        assert!(entry.has_tag("a"));
        assert!(!entry.has_tag("b"));
    }
}
