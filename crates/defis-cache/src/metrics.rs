//! Prometheus metrics for the in-process caches.
//!
//! Every metric carries a `cache` label with the cache name.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names for the cache layer.
pub mod names {
    /// Lookups answered from a fresh entry.
    pub const CACHE_HITS_TOTAL: &str = "defis_cache_hits_total";
    /// Lookups answered with a stale value.
    pub const CACHE_STALE_HITS_TOTAL: &str = "defis_cache_stale_hits_total";
    /// Lookups that found nothing usable.
    pub const CACHE_MISSES_TOTAL: &str = "defis_cache_misses_total";
    /// Background revalidations that refreshed an entry.
    pub const CACHE_REVALIDATIONS_TOTAL: &str = "defis_cache_revalidations_total";
    /// Background revalidations whose fetch failed.
    pub const CACHE_REVALIDATION_FAILURES_TOTAL: &str = "defis_cache_revalidation_failures_total";
    /// Entries removed by tag invalidation.
    pub const CACHE_INVALIDATED_TOTAL: &str = "defis_cache_invalidated_total";
    /// Entries currently held.
    pub const CACHE_ENTRIES: &str = "defis_cache_entries";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Lookups answered from a fresh entry");
    describe_counter!(
        names::CACHE_STALE_HITS_TOTAL,
        "Lookups answered with a stale value while revalidating"
    );
    describe_counter!(names::CACHE_MISSES_TOTAL, "Lookups that found nothing usable");
    describe_counter!(
        names::CACHE_REVALIDATIONS_TOTAL,
        "Background revalidations that refreshed an entry"
    );
    describe_counter!(
        names::CACHE_REVALIDATION_FAILURES_TOTAL,
        "Background revalidations whose fetch failed"
    );
    describe_counter!(
        names::CACHE_INVALIDATED_TOTAL,
        "Entries removed by tag invalidation"
    );
    describe_gauge!(names::CACHE_ENTRIES, "Entries currently held in memory");
}

pub(crate) fn record_hit(cache: &str) {
    counter!(names::CACHE_HITS_TOTAL, "cache" => cache.to_string()).increment(1);
}

pub(crate) fn record_stale_hit(cache: &str) {
    counter!(names::CACHE_STALE_HITS_TOTAL, "cache" => cache.to_string()).increment(1);
}

pub(crate) fn record_miss(cache: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "cache" => cache.to_string()).increment(1);
}

pub(crate) fn record_revalidation(cache: &str, success: bool) {
    let name = if success {
        names::CACHE_REVALIDATIONS_TOTAL
    } else {
        names::CACHE_REVALIDATION_FAILURES_TOTAL
    };
    counter!(name, "cache" => cache.to_string()).increment(1);
}

pub(crate) fn record_invalidated(cache: &str, count: usize) {
    counter!(names::CACHE_INVALIDATED_TOTAL, "cache" => cache.to_string()).increment(count as u64);
}

pub(crate) fn set_entries(cache: &str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "cache" => cache.to_string()).set(count as f64);
}
