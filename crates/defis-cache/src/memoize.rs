//! Higher-order helpers composing a cache with an async function.

use crate::{CacheOptions, TtlCache};
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Wraps `f` so that each call is served through `cache`.
///
/// `key_fn` derives the cache key from the argument; every call uses the same
/// `options`. The returned closure can be stored and called like `f`.
pub fn memoize_with_ttl<A, V, E, F, Fut, K>(
    cache: TtlCache<V>,
    f: F,
    key_fn: K,
    options: CacheOptions,
) -> impl Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync
where
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Display + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    K: Fn(&A) -> String + Send + Sync + 'static,
{
    let f = Arc::new(f);
    move |arg: A| {
        let key = key_fn(&arg);
        let cache = cache.clone();
        let f = Arc::clone(&f);
        let options = options.clone();
        Box::pin(async move { cache.get_or_set(&key, move || (*f)(arg), options).await })
    }
}

/// Runs `query` through `cache` under `key`.
pub async fn with_cache<V, E, F, Fut>(
    cache: &TtlCache<V>,
    key: impl AsRef<str>,
    options: CacheOptions,
    query: F,
) -> Result<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Display + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    cache.get_or_set(key.as_ref(), query, options).await
}
