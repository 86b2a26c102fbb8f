//! The cache-coherent storage facade.

use super::coherence::{CoherentCallback, WriteEpochs, WriteOp};
use crate::backend::{deliver, Backend, Callback};
use crate::cache::{CachePolicy, CacheProvider};
use crate::error::StoreResult;
use crate::identity;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Store-level configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Expiry policy applied to every cache entry the store writes
    pub cache_policy: CachePolicy,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache expiry policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

/// Snapshot of facade counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Reads answered from the cache
    pub hits: u64,
    /// Reads that went to the backend
    pub misses: u64,
    /// Backend reads installed into the cache
    pub populates: u64,
    /// Backend reads not installed because a write raced them
    pub skipped_populates: u64,
}

impl StoreStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A backend with a coherent cache in front of it.
///
/// Reads are served from the cache when possible. Writes go to the backend
/// with an internal callback that updates the cache once the backend
/// acknowledges them, before the caller's own callback runs. A failed write
/// never touches the cache. `exists` always asks the backend.
///
/// # Example
///
/// ```
/// use stashkv::{backend::MemoryBackend, cache::MemoryCache, CachedStore, StoreConfig};
/// use bytes::Bytes;
/// use std::sync::Arc;
///
/// let store = CachedStore::new(
///     Arc::new(MemoryBackend::new()),
///     Arc::new(MemoryCache::new()),
///     StoreConfig::default(),
/// );
///
/// store.put("users", "42", Bytes::from("ada"), None).unwrap();
/// assert_eq!(store.get("users", "42").unwrap(), Some(Bytes::from("ada")));
/// ```
pub struct CachedStore<V, B, C> {
    backend: Arc<B>,
    cache: Arc<C>,
    epochs: Arc<WriteEpochs>,
    config: StoreConfig,

    hit_count: AtomicU64,
    miss_count: AtomicU64,
    populate_count: AtomicU64,
    skipped_populate_count: AtomicU64,

    _value: PhantomData<fn() -> V>,
}

impl<V, B, C> std::fmt::Debug for CachedStore<V, B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedStore")
            .field("config", &self.config)
            .field("hit_count", &self.hit_count.load(Ordering::Relaxed))
            .field("miss_count", &self.miss_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V, B, C> CachedStore<V, B, C>
where
    V: Clone + Send + Sync + 'static,
    B: Backend<V>,
    C: CacheProvider<V> + 'static,
{
    /// Creates a store over `backend`, caching in `cache`.
    pub fn new(backend: Arc<B>, cache: Arc<C>, config: StoreConfig) -> Self {
        Self {
            backend,
            cache,
            epochs: Arc::new(WriteEpochs::new()),
            config,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            populate_count: AtomicU64::new(0),
            skipped_populate_count: AtomicU64::new(0),
            _value: PhantomData,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reads `(space, key)`, from the cache if possible.
    pub fn get(&self, space: &str, key: &str) -> StoreResult<Option<V>> {
        let cache_key = identity::compose(space, key)?;

        if let Some(value) = self.cache.get(&cache_key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            trace!(space = space, key = key, "Cache hit");
            return Ok(Some(value));
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let seen = self.epochs.snapshot(&cache_key);
        let loaded = self.backend.get(space, key)?;

        if let Some(value) = &loaded {
            let ttl = self.config.cache_policy.ttl();
            let installed = self.epochs.populate_if_unchanged(&cache_key, seen, || {
                self.cache.set(&cache_key, value.clone(), ttl)
            });

            if installed {
                self.populate_count.fetch_add(1, Ordering::Relaxed);
            } else {
                self.skipped_populate_count.fetch_add(1, Ordering::Relaxed);
                debug!(
                    space = space,
                    key = key,
                    "Write raced a cache miss, not populating"
                );
            }
        }

        Ok(loaded)
    }

    /// Reads the raw payload straight from the backend through `mapper`.
    ///
    /// The cache holds decoded values, not payloads, so this always goes to
    /// the backend.
    pub fn get_mapped<T, F>(&self, space: &str, key: &str, mapper: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&str, &str, &[u8]) -> StoreResult<T>,
    {
        self.backend.get_mapped(space, key, mapper)
    }

    /// Writes `(space, key)` and replaces the cached value on success.
    pub fn put(
        &self,
        space: &str,
        key: &str,
        value: V,
        callback: Option<Callback<V>>,
    ) -> StoreResult<()> {
        let cache_key = match identity::compose(space, key) {
            Ok(cache_key) => cache_key,
            Err(err) => return deliver(callback.as_ref(), space, key, Some(&value), Err(err)),
        };

        let coherent = Arc::new(CoherentCallback::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.epochs),
            cache_key,
            self.config.cache_policy.ttl(),
            WriteOp::Put,
            callback,
        ));

        let result = self
            .backend
            .put(space, key, value, Some(Arc::clone(&coherent) as Callback<V>));
        coherent.finish(result)
    }

    /// Deletes `(space, key)` and drops the cached value on success.
    pub fn delete(&self, space: &str, key: &str, callback: Option<Callback<V>>) -> StoreResult<()> {
        let cache_key = match identity::compose(space, key) {
            Ok(cache_key) => cache_key,
            Err(err) => return deliver(callback.as_ref(), space, key, None, Err(err)),
        };

        let coherent = Arc::new(CoherentCallback::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.epochs),
            cache_key,
            self.config.cache_policy.ttl(),
            WriteOp::Delete,
            callback,
        ));

        let result = self
            .backend
            .delete(space, key, Some(Arc::clone(&coherent) as Callback<V>));
        coherent.finish(result)
    }

    /// Asks the backend directly; the cache is never consulted.
    pub fn exists(&self, space: &str, key: &str) -> StoreResult<bool> {
        self.backend.exists(space, key)
    }

    /// Counts entries in a space, `-1` if the backend cannot count.
    pub fn size(&self, space: &str) -> StoreResult<i64> {
        self.backend.size(space)
    }

    /// Returns facade counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            populates: self.populate_count.load(Ordering::Relaxed),
            skipped_populates: self.skipped_populate_count.load(Ordering::Relaxed),
        }
    }
}
