//! Cache provider contract and expiry policy types.

use std::time::Duration;

/// Per-entry expiry deadlines handed to [`CacheProvider::set`].
///
/// `None` means no deadline of that kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheTtl {
    /// Expire this long after the entry was written
    pub after_write: Option<Duration>,
    /// Expire this long after the entry was last read
    pub after_access: Option<Duration>,
}

impl CacheTtl {
    /// No expiry at all.
    pub const NONE: CacheTtl = CacheTtl {
        after_write: None,
        after_access: None,
    };

    pub fn after_write(ttl: Duration) -> Self {
        Self {
            after_write: Some(ttl),
            after_access: None,
        }
    }

    pub fn after_access(ttl: Duration) -> Self {
        Self {
            after_write: None,
            after_access: Some(ttl),
        }
    }
}

/// Store-level choice of expiry policy for cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    ExpireAfterWrite(Duration),
    ExpireAfterAccess(Duration),
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::ExpireAfterAccess(Duration::from_secs(600))
    }
}

impl CachePolicy {
    /// Deadlines to use for every `set`.
    pub fn ttl(&self) -> CacheTtl {
        match *self {
            CachePolicy::ExpireAfterWrite(d) => CacheTtl::after_write(d),
            CachePolicy::ExpireAfterAccess(d) => CacheTtl::after_access(d),
        }
    }
}

/// A key/value cache addressed by composite identity strings.
///
/// The store treats the cache as advisory: none of these calls can fail, and
/// a provider may drop entries at any time.
pub trait CacheProvider<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    fn set(&self, key: &str, value: V, ttl: CacheTtl);

    fn delete(&self, key: &str);
}
