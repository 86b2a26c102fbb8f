//! Cache Coherence Layer internals.
//!
//! Two pieces keep the cache from ever serving a value older than the last
//! acknowledged write:
//!
//! - [`CoherentCallback`] wraps the caller's callback. It mutates the cache
//!   when the backend acknowledges a write and only then forwards the outcome,
//!   so a caller observing its callback sees the cache already updated.
//! - [`WriteEpochs`] orders cache mutations. A read that missed and then
//!   loaded from the backend only installs its value if no write to the same
//!   stripe was acknowledged in between. An acknowledged put only installs
//!   its value if it was the only write in flight on its stripe; otherwise
//!   the backend may have applied the writes in another order than they are
//!   acknowledged, so the entry is dropped and the next read reloads it.

use crate::backend::{Callback, WriteCallback};
use crate::cache::{CacheProvider, CacheTtl};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of epoch stripes.
const NUM_STRIPES: usize = 64;

#[derive(Debug, Default)]
struct Stripe {
    /// Acknowledged writes
    epoch: u64,
    /// Writes handed to the backend and not yet settled
    in_flight: u64,
}

/// Per-stripe write bookkeeping.
pub(crate) struct WriteEpochs {
    stripes: Vec<Mutex<Stripe>>,
}

impl WriteEpochs {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..NUM_STRIPES).map(|_| Mutex::new(Stripe::default())).collect(),
        }
    }

    #[inline]
    fn stripe(&self, cache_key: &str) -> &Mutex<Stripe> {
        let mut hasher = DefaultHasher::new();
        cache_key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % NUM_STRIPES]
    }

    /// Current epoch of the stripe holding `cache_key`.
    pub(crate) fn snapshot(&self, cache_key: &str) -> u64 {
        self.stripe(cache_key).lock().epoch
    }

    /// Registers a write about to be handed to the backend. Returns the
    /// epoch it was issued at.
    pub(crate) fn begin_write(&self, cache_key: &str) -> u64 {
        let mut stripe = self.stripe(cache_key).lock();
        stripe.in_flight += 1;
        stripe.epoch
    }

    /// Settles a write that failed or was never acknowledged.
    pub(crate) fn abandon_write(&self, cache_key: &str) {
        let mut stripe = self.stripe(cache_key).lock();
        stripe.in_flight = stripe.in_flight.saturating_sub(1);
    }

    /// Settles an acknowledged write and applies its cache mutation under the
    /// stripe lock.
    ///
    /// `apply` receives `true` when the write was alone on its stripe from
    /// issue to acknowledgement, so its value is known to be the latest.
    pub(crate) fn record_write<F: FnOnce(bool)>(
        &self,
        cache_key: &str,
        issued_at: u64,
        settle: bool,
        apply: F,
    ) {
        let mut stripe = self.stripe(cache_key).lock();
        if settle {
            stripe.in_flight = stripe.in_flight.saturating_sub(1);
        }
        let alone = settle && stripe.in_flight == 0 && stripe.epoch == issued_at;
        stripe.epoch = stripe.epoch.wrapping_add(1);
        apply(alone);
    }

    /// Applies `apply` only if the stripe epoch still equals `seen`.
    pub(crate) fn populate_if_unchanged<F: FnOnce()>(
        &self,
        cache_key: &str,
        seen: u64,
        apply: F,
    ) -> bool {
        let stripe = self.stripe(cache_key).lock();
        if stripe.epoch != seen {
            return false;
        }
        apply();
        true
    }

    #[cfg(test)]
    fn in_flight(&self, cache_key: &str) -> u64 {
        self.stripe(cache_key).lock().in_flight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Put,
    Delete,
}

/// Error parked for the facade to return when the caller gave no callback.
#[derive(Default)]
struct Unreported {
    error: Option<StoreError>,
    /// Set once the facade has returned; later errors can only be logged
    returned: bool,
}

/// Internal callback handed to the backend for one write.
pub(crate) struct CoherentCallback<V, C> {
    cache: Arc<C>,
    epochs: Arc<WriteEpochs>,
    cache_key: String,
    ttl: CacheTtl,
    op: WriteOp,
    inner: Option<Callback<V>>,
    unreported: Mutex<Unreported>,
    issued_at: u64,
    settled: AtomicBool,
}

impl<V, C> CoherentCallback<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: CacheProvider<V> + 'static,
{
    pub(crate) fn new(
        cache: Arc<C>,
        epochs: Arc<WriteEpochs>,
        cache_key: String,
        ttl: CacheTtl,
        op: WriteOp,
        inner: Option<Callback<V>>,
    ) -> Self {
        let issued_at = epochs.begin_write(&cache_key);
        Self {
            cache,
            epochs,
            cache_key,
            ttl,
            op,
            inner,
            unreported: Mutex::new(Unreported::default()),
            issued_at,
            settled: AtomicBool::new(false),
        }
    }

    /// Marks the write settled. True only for the first outcome.
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    /// Combines the backend's return value with any parked error.
    ///
    /// Must be called once, after the backend call returned.
    pub(crate) fn finish(&self, result: StoreResult<()>) -> StoreResult<()> {
        let mut slot = self.unreported.lock();
        slot.returned = true;
        result?;
        match slot.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<V, C> WriteCallback<V> for CoherentCallback<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: CacheProvider<V> + 'static,
{
    fn on_success(&self, space: &str, key: &str, value: Option<&V>) {
        let settle = self.settle();
        self.epochs
            .record_write(&self.cache_key, self.issued_at, settle, |alone| {
                match (self.op, value) {
                    (WriteOp::Put, Some(value)) if alone => {
                        self.cache.set(&self.cache_key, value.clone(), self.ttl)
                    }
                    // Deletes, overlapping puts and puts acknowledged without a value
                    _ => self.cache.delete(&self.cache_key),
                }
            });
        debug!(space = space, key = key, op = ?self.op, "Write acknowledged, cache updated");

        if let Some(inner) = &self.inner {
            inner.on_success(space, key, value);
        }
    }

    fn on_error(&self, space: &str, key: &str, value: Option<&V>, cause: StoreError) {
        if self.settle() {
            self.epochs.abandon_write(&self.cache_key);
        }

        if let Some(inner) = &self.inner {
            inner.on_error(space, key, value, cause);
            return;
        }

        let mut slot = self.unreported.lock();
        if slot.returned {
            warn!(
                space = space,
                key = key,
                op = ?self.op,
                error = %cause,
                "Write failed after the call returned and no callback was given"
            );
        } else {
            slot.error = Some(cause);
        }
    }
}

impl<V, C> Drop for CoherentCallback<V, C> {
    fn drop(&mut self) {
        // Backend dropped the callback without reporting an outcome
        if !*self.settled.get_mut() {
            self.epochs.abandon_write(&self.cache_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn wrapper(
        cache: &Arc<MemoryCache<u32>>,
        op: WriteOp,
        inner: Option<Callback<u32>>,
    ) -> CoherentCallback<u32, MemoryCache<u32>> {
        CoherentCallback::new(
            Arc::clone(cache),
            Arc::new(WriteEpochs::new()),
            "s:k".to_string(),
            CacheTtl::NONE,
            op,
            inner,
        )
    }

    #[test]
    fn test_populate_skipped_after_write() {
        let epochs = WriteEpochs::new();
        let seen = epochs.snapshot("s:k");

        let issued_at = epochs.begin_write("s:k");
        epochs.record_write("s:k", issued_at, true, |alone| assert!(alone));

        let mut applied = false;
        assert!(!epochs.populate_if_unchanged("s:k", seen, || applied = true));
        assert!(!applied);

        let seen = epochs.snapshot("s:k");
        assert!(epochs.populate_if_unchanged("s:k", seen, || applied = true));
        assert!(applied);
    }

    #[test]
    fn test_put_success_sets_cache() {
        let cache = Arc::new(MemoryCache::new());
        let cb = wrapper(&cache, WriteOp::Put, None);

        cb.on_success("s", "k", Some(&5));
        assert_eq!(cache.get("s:k"), Some(5));
        assert!(cb.finish(Ok(())).is_ok());
    }

    #[test]
    fn test_delete_success_removes_cache() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("s:k", 5, CacheTtl::NONE);
        let cb = wrapper(&cache, WriteOp::Delete, None);

        cb.on_success("s", "k", None);
        assert_eq!(cache.get("s:k"), None);
    }

    #[test]
    fn test_error_without_callback_is_parked() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("s:k", 1, CacheTtl::NONE);
        let cb = wrapper(&cache, WriteOp::Put, None);

        cb.on_error("s", "k", Some(&2), StoreError::Closed);

        assert_eq!(cache.get("s:k"), Some(1));
        assert!(matches!(cb.finish(Ok(())), Err(StoreError::Closed)));
    }

    #[test]
    fn test_late_error_is_only_logged() {
        let cache = Arc::new(MemoryCache::new());
        let cb = wrapper(&cache, WriteOp::Delete, None);

        assert!(cb.finish(Ok(())).is_ok());
        cb.on_error("s", "k", None, StoreError::Closed);
        assert!(cb.unreported.lock().error.is_none());
    }

    #[test]
    fn test_overlapping_puts_drop_the_entry() {
        let cache = Arc::new(MemoryCache::new());
        let epochs = Arc::new(WriteEpochs::new());
        let put = || {
            CoherentCallback::new(
                Arc::clone(&cache),
                Arc::clone(&epochs),
                "s:k".to_string(),
                CacheTtl::NONE,
                WriteOp::Put,
                None,
            )
        };

        // Both issued before either is acknowledged, acknowledged in reverse
        let first = put();
        let second = put();
        assert_eq!(epochs.in_flight("s:k"), 2);

        second.on_success("s", "k", Some(&2));
        assert_eq!(cache.get("s:k"), None);
        first.on_success("s", "k", Some(&1));
        assert_eq!(cache.get("s:k"), None);
        assert_eq!(epochs.in_flight("s:k"), 0);

        // A lone write caches again
        put().on_success("s", "k", Some(&3));
        assert_eq!(cache.get("s:k"), Some(3));
    }

    #[test]
    fn test_failed_or_dropped_write_is_settled() {
        let cache = Arc::new(MemoryCache::new());
        let epochs = Arc::new(WriteEpochs::new());
        let put = || {
            CoherentCallback::new(
                Arc::clone(&cache),
                Arc::clone(&epochs),
                "s:k".to_string(),
                CacheTtl::NONE,
                WriteOp::Put,
                None,
            )
        };

        let failed = put();
        failed.on_error("s", "k", Some(&1), StoreError::Closed);
        assert_eq!(epochs.in_flight("s:k"), 0);
        drop(failed);
        assert_eq!(epochs.in_flight("s:k"), 0);

        let forgotten = put();
        assert_eq!(epochs.in_flight("s:k"), 1);
        drop(forgotten);
        assert_eq!(epochs.in_flight("s:k"), 0);

        put().on_success("s", "k", Some(&7));
        assert_eq!(cache.get("s:k"), Some(7));
    }
}
