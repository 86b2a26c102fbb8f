//! # StashKV - A Cache-Coherent Key/Document Store
//!
//! StashKV stores values by `(space, key)` in a pluggable backend and keeps a
//! local cache in front of it that never serves data older than the last
//! acknowledged write.
//!
//! ## Features
//!
//! - **Two Flavors**: opaque bytes (KV) or structured documents (KD)
//! - **Coherent Caching**: the cache is updated only after the backend
//!   acknowledges a write, and before the caller hears about it
//! - **Full-Text Index Backend**: documents are stored verbatim and their
//!   scalar fields are indexed by type for field search
//! - **Commit Policies**: synchronous commit per write, or periodic
//!   background commit
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               StashKV                                   │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────┐                       │
//! │  │              CachedStore<V, B, C>            │                       │
//! │  │  get: cache ─miss─► backend ─► populate      │                       │
//! │  │  put/delete: backend ─ack─► cache ─► caller  │                       │
//! │  └──────────┬───────────────────────┬───────────┘                       │
//! │             │                       │                                   │
//! │             ▼                       ▼                                   │
//! │  ┌─────────────────────┐  ┌──────────────────────────────────────────┐  │
//! │  │ CacheProvider       │  │ Backend                                  │  │
//! │  │  MemoryCache        │  │  IndexKvStore / IndexDocStore            │  │
//! │  │  (64 shards + TTL)  │  │   writer ─► overlay ─► commit ─► reader  │  │
//! │  │        ▲            │  │  MemoryBackend                           │  │
//! │  │  ExpirySweeper      │  │                                          │  │
//! │  └─────────────────────┘  └──────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use stashkv::{DocStore, Document, IndexConfig, IndexDocStore, MemoryCache, StoreConfig};
//! use std::sync::Arc;
//!
//! let store: DocStore<IndexDocStore> = stashkv::CachedStore::new(
//!     Arc::new(IndexDocStore::open(&IndexConfig::in_memory()).unwrap()),
//!     Arc::new(MemoryCache::new()),
//!     StoreConfig::default(),
//! );
//!
//! let ada = Document::new().with("name", "Ada Lovelace").with("age", 36);
//! store.put("users", "42", ada.clone(), None).unwrap();
//!
//! assert_eq!(store.get("users", "42").unwrap(), Some(ada));
//! assert!(store.exists("users", "42").unwrap());
//! ```
//!
//! ## Module Overview
//!
//! - [`store`]: the cache-coherent facade
//! - [`backend`]: the backend contract, write callbacks, an in-memory backend
//! - [`cache`]: the cache contract and the sharded in-memory cache
//! - [`index`]: the full-text index backend
//! - [`document`]: documents and their scalar values
//! - [`identity`]: `space:key` composite identities
//! - [`error`]: the shared error type

pub mod backend;
pub mod cache;
pub mod document;
pub mod error;
pub mod identity;
pub mod index;
pub mod store;

// Re-export commonly used types for convenience
pub use backend::{Backend, Callback, MemoryBackend, WriteCallback};
pub use cache::{CachePolicy, CacheProvider, MemoryCache};
pub use document::{Document, FieldValue};
pub use error::{StoreError, StoreResult};
pub use identity::EntryId;
pub use index::{
    CommitMode, FieldMatch, IndexConfig, IndexDocStore, IndexKvStore, IndexManager,
};
pub use store::{CachedStore, DocStore, KvStore, StoreConfig, StoreStats};

/// Version of StashKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
