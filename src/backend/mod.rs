//! Backend Contract
//!
//! Every backing engine implements [`Backend`] for its value type: `Bytes`
//! for the KV flavor, [`Document`](crate::Document) for the KD flavor.
//!
//! ## Contract
//!
//! - `get` returns `Ok(None)` for a missing entry.
//! - `put`/`delete` report their outcome to the callback when one is given,
//!   otherwise the error is returned.
//! - Deleting an absent entry succeeds.
//! - `exists` asks the backend directly; it must never be derived from `get`
//!   so that it cannot be answered from any cache.
//! - `size` returns `-1` when the backend cannot count.

pub mod callback;
pub mod memory;

pub use callback::{deliver, Callback, WriteCallback};
pub use memory::MemoryBackend;

use crate::error::{StoreError, StoreResult};

/// The operation set a backing engine must implement.
pub trait Backend<V>: Send + Sync {
    /// Fetches the value stored under `(space, key)`.
    fn get(&self, space: &str, key: &str) -> StoreResult<Option<V>>;

    /// Fetches the raw stored payload and hands it to `mapper`.
    ///
    /// Lets callers decode straight into their own type without building `V`
    /// first. Backends without a raw payload fail with `Unsupported`.
    fn get_mapped<T, F>(&self, space: &str, key: &str, mapper: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&str, &str, &[u8]) -> StoreResult<T>,
        Self: Sized,
    {
        let _ = (space, key, mapper);
        Err(StoreError::Unsupported("get_mapped"))
    }

    /// Stores or overwrites `(space, key)`.
    fn put(&self, space: &str, key: &str, value: V, callback: Option<Callback<V>>)
        -> StoreResult<()>;

    /// Removes `(space, key)` if present.
    fn delete(&self, space: &str, key: &str, callback: Option<Callback<V>>) -> StoreResult<()>;

    /// Checks for presence with a direct backend query.
    fn exists(&self, space: &str, key: &str) -> StoreResult<bool>;

    /// Counts the entries in a space, or `-1` if unsupported.
    fn size(&self, space: &str) -> StoreResult<i64> {
        let _ = space;
        Ok(-1)
    }
}
