//! In-process backend.
//!
//! Keeps entries in a `HashMap` keyed by composite identity. Nothing is
//! persisted and there is no raw payload, so `get_mapped` is unsupported.

use super::callback::{deliver, Callback};
use super::Backend;
use crate::error::StoreResult;
use crate::identity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Stored<V> {
    space: String,
    value: V,
}

/// A volatile [`Backend`] for tests and ephemeral deployments.
pub struct MemoryBackend<V> {
    entries: RwLock<HashMap<String, Stored<V>>>,

    /// Statistics: total GET calls
    get_count: AtomicU64,

    /// Statistics: total EXISTS calls
    exists_count: AtomicU64,
}

impl<V> std::fmt::Debug for MemoryBackend<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl<V> Default for MemoryBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryBackend<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            exists_count: AtomicU64::new(0),
        }
    }

    /// Number of `get` calls served so far.
    pub fn get_calls(&self) -> u64 {
        self.get_count.load(Ordering::Relaxed)
    }

    /// Number of `exists` calls served so far.
    pub fn exists_calls(&self) -> u64 {
        self.exists_count.load(Ordering::Relaxed)
    }
}

impl<V> Backend<V> for MemoryBackend<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, space: &str, key: &str) -> StoreResult<Option<V>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let id = identity::compose(space, key)?;
        Ok(self.entries.read().get(&id).map(|s| s.value.clone()))
    }

    fn put(
        &self,
        space: &str,
        key: &str,
        value: V,
        callback: Option<Callback<V>>,
    ) -> StoreResult<()> {
        let result = identity::compose(space, key).map(|id| {
            self.entries.write().insert(
                id,
                Stored {
                    space: space.to_string(),
                    value: value.clone(),
                },
            );
        });
        deliver(callback.as_ref(), space, key, Some(&value), result)
    }

    fn delete(&self, space: &str, key: &str, callback: Option<Callback<V>>) -> StoreResult<()> {
        let result = identity::compose(space, key).map(|id| {
            self.entries.write().remove(&id);
        });
        deliver(callback.as_ref(), space, key, None, result)
    }

    fn exists(&self, space: &str, key: &str) -> StoreResult<bool> {
        self.exists_count.fetch_add(1, Ordering::Relaxed);
        let id = identity::compose(space, key)?;
        Ok(self.entries.read().contains_key(&id))
    }

    fn size(&self, space: &str) -> StoreResult<i64> {
        identity::validate_space(space)?;
        let count = self
            .entries
            .read()
            .values()
            .filter(|s| s.space == space)
            .count();
        Ok(count as i64)
    }
}
