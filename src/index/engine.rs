//! Index-backed storage engines.
//!
//! [`IndexKvStore`] stores opaque bytes, [`IndexDocStore`] stores documents
//! and projects their scalars for field search. Both share an
//! [`IndexHandle`], which owns the core and, in async mode, the background
//! commit task.

use super::commit::CommitScheduler;
use super::config::{CommitMode, IndexConfig};
use super::core::IndexCore;
use super::encode::{FieldMatch, Projection};
use crate::backend::{deliver, Backend, Callback};
use crate::document::Document;
use crate::error::StoreResult;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// An open index and its commit policy.
#[derive(Debug)]
pub struct IndexHandle {
    core: Arc<IndexCore>,
    scheduler: Mutex<Option<CommitScheduler>>,
    mode: CommitMode,
}

impl IndexHandle {
    /// Opens the index described by `config`.
    ///
    /// Async mode needs a tokio runtime to run the commit task. Without one,
    /// or without a positive interval, the engine logs a warning and commits
    /// synchronously.
    pub fn open(config: &IndexConfig) -> StoreResult<Self> {
        let mut mode = config.effective_commit_mode();

        let runtime = match mode {
            CommitMode::Async => match Handle::try_current() {
                Ok(runtime) => Some(runtime),
                Err(_) => {
                    warn!(
                        location = ?config.location,
                        "Async commit requested outside a tokio runtime, committing synchronously"
                    );
                    mode = CommitMode::Sync;
                    None
                }
            },
            CommitMode::Sync => None,
        };

        let core = Arc::new(IndexCore::open(config, mode == CommitMode::Sync)?);
        let scheduler = runtime
            .map(|runtime| CommitScheduler::start(&core, config.commit_interval(), &runtime));

        Ok(Self {
            core,
            scheduler: Mutex::new(scheduler),
            mode,
        })
    }

    /// The commit mode in effect, after any fallback.
    pub fn commit_mode(&self) -> CommitMode {
        self.mode
    }

    /// Commits now. Returns how many uncommitted writes became durable.
    pub fn commit(&self) -> StoreResult<usize> {
        self.core.commit()
    }

    /// Stops the commit task and performs a final commit.
    ///
    /// Every later operation fails with `Closed`. Dropping without closing
    /// discards uncommitted writes.
    pub fn close(&self) -> StoreResult<()> {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        self.core.close()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Writes not yet committed.
    pub fn pending_writes(&self) -> usize {
        self.core.pending_len()
    }

    pub fn commit_count(&self) -> u64 {
        self.core.commit_count()
    }

    fn core(&self) -> &IndexCore {
        &self.core
    }
}

fn log_write(op: &'static str, space: &str, key: &str, result: &StoreResult<()>) {
    match result {
        Ok(()) => debug!(op = op, space = space, key = key, "Index write applied"),
        Err(err) => warn!(
            op = op,
            space = space,
            key = key,
            error = %err,
            "Index write failed"
        ),
    }
}

// ============================================================================
// KV flavor
// ============================================================================

/// Index engine storing opaque byte values.
///
/// # Example
///
/// ```
/// use stashkv::{Backend, IndexConfig, IndexKvStore};
/// use bytes::Bytes;
///
/// let store = IndexKvStore::open(&IndexConfig::in_memory()).unwrap();
/// store.put("users", "42", Bytes::from("ada"), None).unwrap();
/// assert!(store.exists("users", "42").unwrap());
/// store.close().unwrap();
/// ```
#[derive(Debug)]
pub struct IndexKvStore {
    handle: IndexHandle,
}

impl IndexKvStore {
    pub fn open(config: &IndexConfig) -> StoreResult<Self> {
        Ok(Self {
            handle: IndexHandle::open(config)?,
        })
    }

    pub fn index(&self) -> &IndexHandle {
        &self.handle
    }

    pub fn commit(&self) -> StoreResult<usize> {
        self.handle.commit()
    }

    pub fn close(&self) -> StoreResult<()> {
        self.handle.close()
    }
}

impl Backend<Bytes> for IndexKvStore {
    fn get(&self, space: &str, key: &str) -> StoreResult<Option<Bytes>> {
        self.handle.core().fetch(space, key)
    }

    fn get_mapped<T, F>(&self, space: &str, key: &str, mapper: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&str, &str, &[u8]) -> StoreResult<T>,
    {
        match self.handle.core().fetch(space, key)? {
            Some(payload) => mapper(space, key, &payload).map(Some),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        space: &str,
        key: &str,
        value: Bytes,
        callback: Option<Callback<Bytes>>,
    ) -> StoreResult<()> {
        let result = self.handle.core().upsert(space, key, value.clone(), None);
        log_write("put", space, key, &result);
        deliver(callback.as_ref(), space, key, Some(&value), result)
    }

    fn delete(&self, space: &str, key: &str, callback: Option<Callback<Bytes>>) -> StoreResult<()> {
        let result = self.handle.core().remove(space, key);
        log_write("delete", space, key, &result);
        deliver(callback.as_ref(), space, key, None, result)
    }

    fn exists(&self, space: &str, key: &str) -> StoreResult<bool> {
        self.handle.core().contains(space, key)
    }

    fn size(&self, space: &str) -> StoreResult<i64> {
        self.handle.core().count(space)
    }
}

// ============================================================================
// KD flavor
// ============================================================================

/// Index engine storing documents.
///
/// The serialized document is the stored payload; its scalars are also
/// indexed by field so they can be searched with [`find_keys`](Self::find_keys).
#[derive(Debug)]
pub struct IndexDocStore {
    handle: IndexHandle,
}

impl IndexDocStore {
    pub fn open(config: &IndexConfig) -> StoreResult<Self> {
        Ok(Self {
            handle: IndexHandle::open(config)?,
        })
    }

    pub fn index(&self) -> &IndexHandle {
        &self.handle
    }

    pub fn commit(&self) -> StoreResult<usize> {
        self.handle.commit()
    }

    pub fn close(&self) -> StoreResult<()> {
        self.handle.close()
    }

    /// Returns up to `limit` keys in `space` whose field `field` matches.
    pub fn find_keys(
        &self,
        space: &str,
        field: &str,
        matcher: &FieldMatch,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        self.handle.core().find_keys(space, field, matcher, limit)
    }

    fn store(&self, space: &str, key: &str, doc: &Document) -> StoreResult<()> {
        let payload = Bytes::from(doc.to_payload()?);
        self.handle
            .core()
            .upsert(space, key, payload, Some(Projection::of(doc)))
    }
}

impl Backend<Document> for IndexDocStore {
    fn get(&self, space: &str, key: &str) -> StoreResult<Option<Document>> {
        match self.handle.core().fetch(space, key)? {
            Some(payload) => Document::from_payload(&payload).map(Some),
            None => Ok(None),
        }
    }

    fn get_mapped<T, F>(&self, space: &str, key: &str, mapper: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&str, &str, &[u8]) -> StoreResult<T>,
    {
        match self.handle.core().fetch(space, key)? {
            Some(payload) => mapper(space, key, &payload).map(Some),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        space: &str,
        key: &str,
        value: Document,
        callback: Option<Callback<Document>>,
    ) -> StoreResult<()> {
        let result = self.store(space, key, &value);
        log_write("put", space, key, &result);
        deliver(callback.as_ref(), space, key, Some(&value), result)
    }

    fn delete(
        &self,
        space: &str,
        key: &str,
        callback: Option<Callback<Document>>,
    ) -> StoreResult<()> {
        let result = self.handle.core().remove(space, key);
        log_write("delete", space, key, &result);
        deliver(callback.as_ref(), space, key, None, result)
    }

    fn exists(&self, space: &str, key: &str) -> StoreResult<bool> {
        self.handle.core().contains(space, key)
    }

    fn size(&self, space: &str) -> StoreResult<i64> {
        self.handle.core().count(space)
    }
}
