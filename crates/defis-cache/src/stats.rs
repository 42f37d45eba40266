//! Cache statistics snapshot.

use serde::Serialize;
use std::collections::BTreeMap;

/// Point-in-time view of a cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries held in memory, expired ones included.
    pub total_entries: usize,
    /// Entries that would produce a hit right now.
    pub fresh_entries: usize,
    /// Expired entries still held (kept for stale serving until purged).
    pub expired_entries: usize,
    /// Entries with a background refresh in flight.
    pub revalidating_entries: usize,
    /// Number of entries carrying each tag.
    pub entries_per_tag: BTreeMap<String, usize>,
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups answered with an expired value under stale-while-revalidate.
    pub stale_hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
}

impl CacheStats {
    /// Share of lookups served from the cache (fresh or stale).
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_stale_hits() {
        let stats = CacheStats {
            hits: 2,
            stale_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
