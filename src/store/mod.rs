//! Storage Facade Module
//!
//! [`CachedStore`] puts a [`CacheProvider`](crate::cache::CacheProvider) in
//! front of any [`Backend`](crate::backend::Backend) and keeps the two
//! coherent.
//!
//! ## Protocol
//!
//! ```text
//!  get ──► cache hit? ──yes──► return cached value
//!              │no
//!              ▼
//!         backend.get ──► populate cache (unless a write raced) ──► return
//!
//!  put/delete ──► backend.put/delete(CoherentCallback)
//!                          │
//!            success ◄─────┴─────► failure
//!               │                     │
//!     set / remove cache entry    cache untouched
//!               │                     │
//!               ▼                     ▼
//!       caller on_success       caller on_error (or returned Err)
//!
//!  exists ──► backend.exists  (never the cache)
//! ```

mod coherence;
pub mod facade;

pub use facade::{CachedStore, StoreConfig, StoreStats};

use crate::cache::MemoryCache;
use crate::Document;
use bytes::Bytes;

/// KV flavor: opaque byte values.
pub type KvStore<B, C = MemoryCache<Bytes>> = CachedStore<Bytes, B, C>;

/// KD flavor: structured documents.
pub type DocStore<B, C = MemoryCache<Document>> = CachedStore<Document, B, C>;
