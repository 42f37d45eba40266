//! TTL cache with tag invalidation and stale-while-revalidate.

use crate::entry::CacheEntry;
use crate::metrics as cache_metrics;
use crate::{CacheOptions, CacheStats};
use defis_config::CacheConfig;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default TTL for cached items (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Lifetime used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Expiry instant for an entry written now.
fn expiry_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Outcome of a synchronous lookup made before any fetch.
enum Lookup<V> {
    Fresh(V),
    /// Expired value; `revalidate` carries the entry version when this caller
    /// won the right to start the background refresh.
    Stale { value: V, revalidate: Option<u64> },
    Miss,
}

struct Inner<V> {
    name: String,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    /// Per-key locks serializing cold-miss fetches.
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_version: AtomicU64,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
}

/// In-process cache keyed by string.
///
/// Cloning is cheap and every clone shares the same entries, so one instance
/// can be constructed at startup and handed to whichever components need it.
///
/// Concurrent `get_or_set` callers racing on the same missing key are
/// serialized: the first one runs `fetch`, the others wait and then read the
/// value it stored. If that fetch fails, only its caller sees the error and
/// the next waiter fetches on its own.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.inner.name)
            .field("default_ttl", &self.inner.default_ttl)
            .field("entries", &self.inner.entries.lock().len())
            .finish()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new(name: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                default_ttl,
                entries: Mutex::new(HashMap::new()),
                fetch_locks: Mutex::new(HashMap::new()),
                next_version: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                stale_hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a cache using the configured default TTL.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &CacheConfig) -> Self {
        Self::new(name, config.default_ttl())
    }

    /// Returns the cache name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the TTL applied when options carry none.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Stores `value` under `key`, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V, options: &CacheOptions) {
        let key = key.into();
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
        let entry = CacheEntry::new(
            value,
            expiry_after(ttl),
            options.tags.iter().cloned().collect(),
            self.next_version(),
        );

        let len = {
            let mut entries = self.inner.entries.lock();
            entries.insert(key.clone(), entry);
            entries.len()
        };
        cache_metrics::set_entries(&self.inner.name, len);
        debug!(cache = %self.inner.name, key = %key, ttl = ?ttl, "Cached key");
    }

    /// Returns the value stored under `key` if it has not expired.
    ///
    /// A cached value is returned whatever it is; `None` only means absent
    /// or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = {
            let entries = self.inner.entries.lock();
            entries
                .get(key)
                .filter(|entry| entry.is_fresh(Instant::now()))
                .map(|entry| entry.value.clone())
        };

        match &value {
            Some(_) => self.record_hit(key),
            None => self.record_miss(key),
        }
        value
    }

    /// Checks whether `key` holds an unexpired entry, without touching stats.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.is_fresh(Instant::now()))
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// * Fresh entry: returned without calling `fetch`.
    /// * Missing entry, or expired without stale-while-revalidate: `fetch` is
    ///   awaited; its error is returned and nothing is cached.
    /// * Expired entry with stale-while-revalidate: the stale value is
    ///   returned at once and, unless one is already running for this key,
    ///   `fetch` runs in a background task. A failed refresh is logged and the
    ///   stale value keeps serving.
    ///
    /// Background refreshes are spawned on the current Tokio runtime.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, fetch: F, options: CacheOptions) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        match self.lookup(key, options.stale_while_revalidate) {
            Lookup::Fresh(value) => return Ok(value),
            Lookup::Stale { value, revalidate } => {
                if let Some(version) = revalidate {
                    self.spawn_revalidation(key.to_string(), version, fetch, options);
                }
                return Ok(value);
            }
            Lookup::Miss => {}
        }

        // The slot leaves the lock map when dropped, even if this future is
        // cancelled while waiting or fetching.
        let slot = self.fetch_slot(key);
        let _guard = slot.acquire().await;

        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.fresh_value(key) {
            return Ok(value);
        }

        match fetch().await {
            Ok(value) => {
                self.set(key, value.clone(), &options);
                Ok(value)
            }
            Err(e) => {
                debug!(cache = %self.inner.name, key = %key, error = %e, "Fetch failed, nothing cached");
                Err(e)
            }
        }
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    pub fn delete(&self, key: &str) -> bool {
        let (removed, len) = {
            let mut entries = self.inner.entries.lock();
            let removed = entries.remove(key).is_some();
            (removed, entries.len())
        };
        cache_metrics::set_entries(&self.inner.name, len);
        debug!(cache = %self.inner.name, key = %key, removed, "Deleted key");
        removed
    }

    /// Removes every entry carrying `tag` and returns how many were removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let (removed, len) = {
            let mut entries = self.inner.entries.lock();
            let before = entries.len();
            entries.retain(|_, entry| !entry.has_tag(tag));
            (before - entries.len(), entries.len())
        };

        cache_metrics::set_entries(&self.inner.name, len);
        cache_metrics::record_invalidated(&self.inner.name, removed);
        info!(cache = %self.inner.name, tag = %tag, removed, "Invalidated entries by tag");
        removed
    }

    /// Removes every entry carrying any of `tags`.
    pub fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        tags.iter().map(|tag| self.invalidate_by_tag(tag.as_ref())).sum()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.inner.entries.lock();
            let removed = entries.len();
            entries.clear();
            removed
        };
        cache_metrics::set_entries(&self.inner.name, 0);
        info!(cache = %self.inner.name, removed, "Cache cleared");
    }

    /// Drops expired entries that are not being revalidated.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let (removed, len) = {
            let mut entries = self.inner.entries.lock();
            let before = entries.len();
            entries.retain(|_, entry| entry.is_fresh(now) || entry.is_revalidating);
            (before - entries.len(), entries.len())
        };

        if removed > 0 {
            cache_metrics::set_entries(&self.inner.name, len);
            debug!(cache = %self.inner.name, removed, "Purged expired entries");
        }
        removed
    }

    /// Returns the number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` if no entry is held.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut stats = CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            stale_hits: self.inner.stale_hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        };

        let entries = self.inner.entries.lock();
        let mut per_tag: BTreeMap<String, usize> = BTreeMap::new();
        for entry in entries.values() {
            stats.total_entries += 1;
            if entry.is_fresh(now) {
                stats.fresh_entries += 1;
            } else {
                stats.expired_entries += 1;
            }
            if entry.is_revalidating {
                stats.revalidating_entries += 1;
            }
            for tag in &entry.tags {
                *per_tag.entry(tag.clone()).or_default() += 1;
            }
        }
        stats.entries_per_tag = per_tag;
        stats
    }

    fn next_version(&self) -> u64 {
        self.inner.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn record_hit(&self, key: &str) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        cache_metrics::record_hit(&self.inner.name);
        debug!(cache = %self.inner.name, key = %key, "Cache hit");
    }

    fn record_miss(&self, key: &str) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        cache_metrics::record_miss(&self.inner.name);
        debug!(cache = %self.inner.name, key = %key, "Cache miss");
    }

    /// Lookup without hit/miss accounting, used after waiting on a fetch lock.
    fn fresh_value(&self, key: &str) -> Option<V> {
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    fn lookup(&self, key: &str, stale_while_revalidate: bool) -> Lookup<V> {
        let lookup = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key) {
                Some(entry) if entry.is_fresh(Instant::now()) => Lookup::Fresh(entry.value.clone()),
                Some(entry) if stale_while_revalidate => {
                    let revalidate = if entry.is_revalidating {
                        None
                    } else {
                        entry.is_revalidating = true;
                        Some(entry.version)
                    };
                    Lookup::Stale {
                        value: entry.value.clone(),
                        revalidate,
                    }
                }
                _ => Lookup::Miss,
            }
        };

        match &lookup {
            Lookup::Fresh(_) => self.record_hit(key),
            Lookup::Stale { .. } => {
                self.inner.stale_hits.fetch_add(1, Ordering::Relaxed);
                cache_metrics::record_stale_hit(&self.inner.name);
                debug!(cache = %self.inner.name, key = %key, "Serving stale value");
            }
            Lookup::Miss => self.record_miss(key),
        }
        lookup
    }

    fn spawn_revalidation<F, Fut, E>(&self, key: String, version: u64, fetch: F, options: CacheOptions)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cache = self.clone();
        debug!(cache = %self.inner.name, key = %key, "Starting background revalidation");

        tokio::spawn(async move {
            let revalidation = Revalidation {
                cache,
                key,
                version,
                options,
                finished: false,
            };
            match fetch().await {
                Ok(value) => revalidation.finish(Some(value)),
                Err(e) => {
                    warn!(
                        cache = %revalidation.cache.inner.name,
                        key = %revalidation.key,
                        error = %e,
                        "Background revalidation failed, keeping stale value"
                    );
                    revalidation.finish(None);
                }
            }
        });
    }

    /// Applies a revalidation result, unless the entry it started from was
    /// deleted or replaced in the meantime.
    fn finish_revalidation(&self, key: &str, version: u64, value: Option<V>, options: &CacheOptions) {
        let success = value.is_some();
        let applied = {
            let mut entries = self.inner.entries.lock();
            match entries.entry(key.to_string()) {
                Entry::Occupied(mut occupied) if occupied.get().version == version => {
                    match value {
                        Some(value) => {
                            let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
                            let tags: HashSet<String> = options.tags.iter().cloned().collect();
                            occupied.insert(CacheEntry::new(value, expiry_after(ttl), tags, self.next_version()));
                        }
                        None => occupied.get_mut().is_revalidating = false,
                    }
                    true
                }
                _ => false,
            }
        };

        cache_metrics::record_revalidation(&self.inner.name, success);
        if applied {
            debug!(cache = %self.inner.name, key = %key, success, "Revalidation finished");
        } else {
            debug!(cache = %self.inner.name, key = %key, "Entry changed during revalidation, result discarded");
        }
    }

    fn fetch_slot<'a>(&'a self, key: &'a str) -> FetchSlot<'a, V> {
        let mut locks = self.inner.fetch_locks.lock();
        let lock = Arc::clone(locks.entry(key.to_string()).or_default());
        FetchSlot {
            cache: self,
            key,
            lock: Some(lock),
        }
    }
}

/// Claim on the per-key fetch lock of a cold miss.
struct FetchSlot<'a, V> {
    cache: &'a TtlCache<V>,
    key: &'a str,
    /// Only `None` once dropped.
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<V> FetchSlot<'_, V> {
    async fn acquire(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

impl<V> Drop for FetchSlot<'_, V> {
    fn drop(&mut self) {
        let mut locks = self.cache.inner.fetch_locks.lock();
        if let Some(lock) = self.lock.take() {
            // One reference in the map, one held here: nobody else waits.
            // The reference is released while the map is still locked.
            if Arc::strong_count(&lock) == 2 {
                locks.remove(self.key);
            }
        }
    }
}

/// Background refresh of one entry.
///
/// If the task ends without calling `finish` (the fetch panicked or the
/// runtime shut down), dropping it clears the entry's revalidating flag so a
/// later caller can try again.
struct Revalidation<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: TtlCache<V>,
    key: String,
    version: u64,
    options: CacheOptions,
    finished: bool,
}

impl<V> Revalidation<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn finish(mut self, value: Option<V>) {
        self.finished = true;
        self.cache
            .finish_revalidation(&self.key, self.version, value, &self.options);
    }
}

impl<V> Drop for Revalidation<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            warn!(cache = %self.cache.inner.name, key = %self.key, "Background revalidation aborted");
            self.cache
                .finish_revalidation(&self.key, self.version, None, &self.options);
        }
    }
}
