//! Index Core
//!
//! Owns the index, its single writer, a manually reloaded reader and the
//! overlay of uncommitted writes.
//!
//! ## Visibility
//!
//! ```text
//!             ┌──────────────────────┐
//!  upsert ───►│ writer (uncommitted) │──commit──► segments ──reload──► reader
//!  remove ─┐  └──────────────────────┘                                   │
//!          │  ┌──────────────────────┐                                   │
//!          └─►│ overlay: id → op     │◄── fetch / contains / count ──────┘
//!             └──────────────────────┘     (overlay first, then reader)
//! ```
//!
//! The reader only sees committed segments, so every staged write is also
//! recorded in the overlay. A commit reloads the reader and then clears the
//! overlay, all while holding the writer lock. Readers take the overlay read
//! lock before grabbing a searcher, so they never observe the window between
//! reload and clear from the wrong side.

use super::config::{IndexConfig, IndexLocation};
use super::encode::{build_record, FieldMatch, Projection};
use super::schema::{build_schema, IndexFields};
use crate::error::{StoreError, StoreResult};
use crate::identity;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, OwnedValue};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
};
use tracing::{debug, error, info, warn};

/// An uncommitted write, keyed by composite identity in the overlay.
#[derive(Debug)]
enum Pending {
    Put {
        space: String,
        key: String,
        payload: Bytes,
        projection: Option<Projection>,
    },
    Delete {
        space: String,
    },
}

impl Pending {
    fn space(&self) -> &str {
        match self {
            Pending::Put { space, .. } | Pending::Delete { space } => space,
        }
    }
}

/// The index, its writer and reader, and the uncommitted overlay.
pub struct IndexCore {
    index: Index,
    fields: IndexFields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    pending: RwLock<HashMap<String, Pending>>,
    sync_commit: bool,
    closed: AtomicBool,
    commit_count: AtomicU64,
    #[cfg(test)]
    fail_next_add: AtomicBool,
}

impl std::fmt::Debug for IndexCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCore")
            .field("sync_commit", &self.sync_commit)
            .field("pending", &self.pending.read().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("commit_count", &self.commit_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl IndexCore {
    /// Opens or creates the index described by `config`.
    ///
    /// With `sync_commit`, every write commits before returning.
    pub fn open(config: &IndexConfig, sync_commit: bool) -> StoreResult<Self> {
        let (schema, fields) = build_schema();

        let index = match &config.location {
            IndexLocation::Memory => Index::create_in_ram(schema),
            IndexLocation::Directory(path) => {
                std::fs::create_dir_all(path)?;
                let directory = MmapDirectory::open(path)?;
                Index::open_or_create(directory, schema)?
            }
        };

        let writer: IndexWriter =
            index.writer_with_num_threads(config.writer_threads, config.writer_memory_bytes)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        info!(
            location = ?config.location,
            sync_commit = sync_commit,
            "Index opened"
        );

        Ok(Self {
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
            pending: RwLock::new(HashMap::new()),
            sync_commit,
            closed: AtomicBool::new(false),
            commit_count: AtomicU64::new(0),
            #[cfg(test)]
            fail_next_add: AtomicBool::new(false),
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn is_sync(&self) -> bool {
        self.sync_commit
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of writes not yet committed.
    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.read().is_empty()
    }

    /// Number of successful commits since open.
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn term(&self, field: Field, text: &str) -> Term {
        Term::from_field_text(field, text)
    }

    fn term_query(&self, field: Field, text: &str) -> TermQuery {
        TermQuery::new(self.term(field, text), IndexRecordOption::Basic)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Replaces whatever is stored under `(space, key)`.
    pub fn upsert(
        &self,
        space: &str,
        key: &str,
        payload: Bytes,
        projection: Option<Projection>,
    ) -> StoreResult<()> {
        self.ensure_open()?;
        let composite = identity::compose(space, key)?;
        let record = build_record(
            &self.fields,
            space,
            key,
            &composite,
            &payload,
            projection.as_ref(),
        );

        let mut writer = self.writer.lock();
        self.ensure_open()?;

        writer.delete_term(self.term(self.fields.id, &composite));
        if let Err(err) = self.add_record(&writer, record) {
            return Err(self.reject_write(&mut writer, &composite, err));
        }

        self.pending.write().insert(
            composite,
            Pending::Put {
                space: space.to_string(),
                key: key.to_string(),
                payload,
                projection,
            },
        );

        self.finish_write(&mut writer)
    }

    /// Removes `(space, key)`. Removing an absent entry succeeds.
    pub fn remove(&self, space: &str, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let composite = identity::compose(space, key)?;

        let mut writer = self.writer.lock();
        self.ensure_open()?;

        writer.delete_term(self.term(self.fields.id, &composite));
        self.pending.write().insert(
            composite,
            Pending::Delete {
                space: space.to_string(),
            },
        );

        self.finish_write(&mut writer)
    }

    fn add_record(&self, writer: &IndexWriter, record: TantivyDocument) -> tantivy::Result<u64> {
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }
        writer.add_document(record)
    }

    #[cfg(test)]
    fn injected_failure(&self) -> Option<tantivy::TantivyError> {
        self.fail_next_add
            .swap(false, Ordering::AcqRel)
            .then(|| tantivy::TantivyError::ErrorInThread("indexing worker gone".to_string()))
    }

    #[cfg(not(test))]
    fn injected_failure(&self) -> Option<tantivy::TantivyError> {
        None
    }

    /// Handles a record the writer refused.
    ///
    /// In sync mode the overlay holds nothing but this write, so the writer
    /// is rolled back. In async mode the overlay holds earlier writes that
    /// were already acknowledged; they are kept and only this write fails.
    /// The writer refuses records once its indexing workers are gone, and
    /// then every later commit fails too, so its staged delete is never
    /// committed.
    fn reject_write(
        &self,
        writer: &mut IndexWriter,
        composite: &str,
        err: tantivy::TantivyError,
    ) -> StoreError {
        if self.sync_commit {
            self.abandon(writer);
        } else {
            error!(
                id = composite,
                pending = self.pending_len(),
                error = %err,
                "Index writer refused a record, keeping earlier uncommitted writes"
            );
        }
        err.into()
    }

    /// Commits right away in sync mode. A failed commit rolls the write back.
    fn finish_write(&self, writer: &mut IndexWriter) -> StoreResult<()> {
        if !self.sync_commit {
            return Ok(());
        }

        if let Err(err) = writer.commit() {
            self.abandon(writer);
            return Err(err.into());
        }
        self.publish()?;
        Ok(())
    }

    /// Discards every uncommitted write.
    ///
    /// Only used in sync mode, where nothing uncommitted was acknowledged.
    fn abandon(&self, writer: &mut IndexWriter) {
        let discarded = {
            let mut pending = self.pending.write();
            let discarded = pending.len();
            pending.clear();
            discarded
        };

        match writer.rollback() {
            Ok(_) => warn!(discarded = discarded, "Rolled back uncommitted writes"),
            Err(err) => warn!(
                discarded = discarded,
                error = %err,
                "Rollback failed after a write error"
            ),
        }
    }

    /// Makes the last commit visible to readers and drops the overlay.
    ///
    /// Must be called with the writer lock held.
    fn publish(&self) -> StoreResult<usize> {
        self.reader.reload()?;

        let flushed = {
            let mut pending = self.pending.write();
            let flushed = pending.len();
            pending.clear();
            flushed
        };
        self.commit_count.fetch_add(1, Ordering::Relaxed);

        Ok(flushed)
    }

    /// Commits every staged write. Returns how many overlay entries became
    /// durable.
    ///
    /// On failure the overlay is kept, so the writes stay visible and are
    /// retried by the next commit.
    pub fn commit(&self) -> StoreResult<usize> {
        let mut writer = self.writer.lock();
        self.ensure_open()?;
        self.commit_locked(&mut writer)
    }

    fn commit_locked(&self, writer: &mut IndexWriter) -> StoreResult<usize> {
        writer.commit()?;
        let flushed = self.publish()?;
        debug!(flushed = flushed, "Index committed");
        Ok(flushed)
    }

    /// Final commit, then refuse any further operation.
    pub fn close(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let result = self.commit_locked(&mut writer);
        self.closed.store(true, Ordering::Release);

        match &result {
            Ok(flushed) => info!(flushed = flushed, "Index closed"),
            Err(err) => warn!(error = %err, "Final commit failed while closing index"),
        }
        result.map(|_| ())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the stored payload for `(space, key)`.
    pub fn fetch(&self, space: &str, key: &str) -> StoreResult<Option<Bytes>> {
        self.ensure_open()?;
        let composite = identity::compose(space, key)?;

        let searcher = {
            let pending = self.pending.read();
            match pending.get(&composite) {
                Some(Pending::Put { payload, .. }) => return Ok(Some(payload.clone())),
                Some(Pending::Delete { .. }) => return Ok(None),
                None => self.reader.searcher(),
            }
        };

        self.committed_payload(&searcher, &composite)
    }

    fn committed_payload(&self, searcher: &Searcher, composite: &str) -> StoreResult<Option<Bytes>> {
        let query = self.term_query(self.fields.id, composite);
        let hits = searcher.search(&query, &TopDocs::with_limit(2))?;

        let address = match hits.as_slice() {
            [] => return Ok(None),
            [(_, address)] => *address,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "{} matches more than one record",
                    composite
                )))
            }
        };

        let record: TantivyDocument = searcher.doc(address)?;
        match record.get_first(self.fields.payload).map(OwnedValue::from) {
            Some(OwnedValue::Bytes(bytes)) => Ok(Some(Bytes::from(bytes.clone()))),
            _ => Err(StoreError::Corrupt(format!(
                "{} has no stored payload",
                composite
            ))),
        }
    }

    fn committed_contains(&self, searcher: &Searcher, composite: &str) -> StoreResult<bool> {
        let query = self.term_query(self.fields.id, composite);
        Ok(searcher.search(&query, &Count)? > 0)
    }

    /// Checks presence without reading the payload.
    pub fn contains(&self, space: &str, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let composite = identity::compose(space, key)?;

        let searcher = {
            let pending = self.pending.read();
            match pending.get(&composite) {
                Some(Pending::Put { .. }) => return Ok(true),
                Some(Pending::Delete { .. }) => return Ok(false),
                None => self.reader.searcher(),
            }
        };

        self.committed_contains(&searcher, &composite)
    }

    /// Counts the entries in `space`, including uncommitted writes.
    ///
    /// Advisory: concurrent writes may or may not be reflected.
    pub fn count(&self, space: &str) -> StoreResult<i64> {
        self.ensure_open()?;
        identity::validate_space(space)?;

        let pending = self.pending.read();
        let searcher = self.reader.searcher();

        let committed = searcher.search(&self.term_query(self.fields.space, space), &Count)?;
        let mut total = committed as i64;

        for (composite, op) in pending.iter().filter(|(_, op)| op.space() == space) {
            let was_committed = self.committed_contains(&searcher, composite)?;
            match op {
                Pending::Put { .. } if !was_committed => total += 1,
                Pending::Delete { .. } if was_committed => total -= 1,
                _ => {}
            }
        }

        Ok(total)
    }

    /// Returns up to `limit` keys in `space` whose field `name` matches.
    ///
    /// Keys come back sorted. Uncommitted writes are taken into account.
    pub fn find_keys(
        &self,
        space: &str,
        name: &str,
        matcher: &FieldMatch,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        identity::validate_space(space)?;
        let terms = matcher.terms(name)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(terms.len() + 1);
        clauses.push((
            Occur::Must,
            Box::new(self.term_query(self.fields.space, space)),
        ));
        for term in &terms {
            let mut alternatives: Vec<(Occur, Box<dyn Query>)> = term
                .index_terms(&self.fields)
                .into_iter()
                .map(|t| {
                    let query: Box<dyn Query> =
                        Box::new(TermQuery::new(t, IndexRecordOption::Basic));
                    (Occur::Should, query)
                })
                .collect();
            let clause: Box<dyn Query> = match alternatives.len() {
                1 => alternatives.remove(0).1,
                _ => Box::new(BooleanQuery::new(alternatives)),
            };
            clauses.push((Occur::Must, clause));
        }
        let query = BooleanQuery::new(clauses);

        let pending = self.pending.read();
        let searcher = self.reader.searcher();

        let hits = searcher.search(&query, &TopDocs::with_limit(limit + pending.len()))?;
        let mut keys = BTreeSet::new();

        for (_, address) in hits {
            let record: TantivyDocument = searcher.doc(address)?;
            let key = match record.get_first(self.fields.key).map(OwnedValue::from) {
                Some(OwnedValue::Str(key)) => key.clone(),
                _ => {
                    return Err(StoreError::Corrupt(format!(
                        "record in space {:?} has no stored key",
                        space
                    )))
                }
            };
            // Overlay entries supersede committed records
            if !pending.contains_key(&identity::compose(space, &key)?) {
                keys.insert(key);
            }
        }

        for op in pending.values() {
            if let Pending::Put {
                space: op_space,
                key,
                projection: Some(projection),
                ..
            } = op
            {
                if op_space == space && terms.iter().all(|t| projection.contains(t)) {
                    keys.insert(key.clone());
                }
            }
        }

        Ok(keys.into_iter().take(limit).collect())
    }
}

impl Drop for IndexCore {
    fn drop(&mut self) {
        let lost = self.pending.get_mut().len();
        if lost > 0 && !self.closed.load(Ordering::Relaxed) {
            warn!(lost = lost, "Index dropped without close, discarding uncommitted writes");
        }
    }
}
