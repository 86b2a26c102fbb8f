//! Sharded In-Memory Cache with Expiry Support
//!
//! The default [`CacheProvider`]. Entries live in a fixed set of shards, each
//! a `HashMap` behind its own `RwLock`, so readers and writers of different
//! keys rarely contend.
//!
//! ## Expiry
//!
//! Every entry carries up to two deadlines:
//!
//! 1. **After write**: fixed at insertion time.
//! 2. **After access**: pushed forward on every hit.
//!
//! Expired entries are dropped lazily when touched, and actively by the
//! [`ExpirySweeper`](super::expiry::ExpirySweeper) calling
//! [`MemoryCache::cleanup_expired`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryCache                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::provider::{CacheProvider, CacheTtl};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of shards in the cache.
const NUM_SHARDS: usize = 64;

/// A cached value with its expiry deadlines.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Hard deadline set at write time (None = no write expiry)
    pub write_deadline: Option<Instant>,
    /// Idle period after which the entry expires (None = no access expiry)
    pub idle_ttl: Option<Duration>,
    /// Last time the entry was written or read
    pub last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: CacheTtl) -> Self {
        let now = Instant::now();
        Self {
            value,
            // A deadline past the clock's range never arrives
            write_deadline: ttl.after_write.and_then(|d| now.checked_add(d)),
            idle_ttl: ttl.after_access,
            last_accessed: now,
        }
    }

    /// Checks both deadlines against `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        let written_out = self.write_deadline.map(|d| now >= d).unwrap_or(false);
        let idled_out = self
            .idle_ttl
            .and_then(|ttl| self.last_accessed.checked_add(ttl))
            .map(|d| now >= d)
            .unwrap_or(false);
        written_out || idled_out
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

type Shard<V> = RwLock<HashMap<String, CacheEntry<V>>>;

/// Thread-safe, sharded, expiring cache.
///
/// # Example
///
/// ```
/// use stashkv::cache::{CacheProvider, CacheTtl, MemoryCache};
/// use std::time::Duration;
///
/// let cache = MemoryCache::new();
/// cache.set("users:42", "ada".to_string(), CacheTtl::after_write(Duration::from_secs(60)));
/// assert_eq!(cache.get("users:42"), Some("ada".to_string()));
/// ```
pub struct MemoryCache<V> {
    shards: Vec<Shard<V>>,

    /// Statistics: number of live entries (approximate)
    entry_count: AtomicU64,

    /// Statistics: lookups that found a live entry
    hit_count: AtomicU64,

    /// Statistics: lookups that found nothing or an expired entry
    miss_count: AtomicU64,

    /// Statistics: entries dropped because they expired
    expired_count: AtomicU64,
}

impl<V> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("shards", &self.shards.len())
            .field("entry_count", &self.entry_count.load(Ordering::Relaxed))
            .field("hit_count", &self.hit_count.load(Ordering::Relaxed))
            .field("miss_count", &self.miss_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            entry_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard<V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Returns the approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut data = shard.write();
            let removed = data.len() as u64;
            data.clear();
            self.entry_count.fetch_sub(removed, Ordering::Relaxed);
        }
    }

    /// Drops expired entries from all shards, returning how many were removed.
    ///
    /// Called by the background expiry sweeper.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.entry_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entry_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone + Send + Sync> CacheProvider<V> for MemoryCache<V> {
    /// Looks up a live entry, refreshing its access deadline.
    fn get(&self, key: &str) -> Option<V> {
        let shard = self.shard(key);
        let now = Instant::now();

        // Fast path: entries without an idle deadline only need a read lock
        {
            let data = shard.read();
            match data.get(key) {
                None => {
                    self.miss_count.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if entry.idle_ttl.is_none() && !entry.is_expired_at(now) => {
                    self.hit_count.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired, or the access deadline needs bumping
        let mut data = shard.write();
        let expired = match data.get(key) {
            Some(entry) => entry.is_expired_at(now),
            // Race: removed between the two locks
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            data.remove(key);
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let entry = data.get_mut(key)?;
        entry.last_accessed = now;
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: V, ttl: CacheTtl) {
        let mut data = self.shard(key).write();
        if data
            .insert(key.to_string(), CacheEntry::new(value, ttl))
            .is_none()
        {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn delete(&self, key: &str) {
        let mut data = self.shard(key).write();
        if data.remove(key).is_some() {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently stored
    pub entries: u64,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that missed
    pub misses: u64,
    /// Entries dropped on expiry
    pub expired: u64,
}

impl CacheStats {
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
