//! # Défis Cache
//!
//! In-process key/value cache used to memoize expensive queries.
//!
//! Entries expire after a per-entry TTL, can be grouped with tags for bulk
//! invalidation, and may be refreshed in the background while the stale
//! value keeps serving callers (stale-while-revalidate).

mod entry;
pub mod keys;
mod memoize;
pub mod metrics;
mod options;
mod stats;
mod sweeper;
mod ttl_cache;

pub use memoize::{memoize_with_ttl, with_cache};
pub use options::CacheOptions;
pub use stats::CacheStats;
pub use sweeper::SweeperHandle;
pub use ttl_cache::{TtlCache, DEFAULT_TTL};
