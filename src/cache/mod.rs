//! Cache Provider Module
//!
//! The cache the storage facade keeps in front of a backend. The facade only
//! needs [`CacheProvider`]; [`MemoryCache`] is the in-process implementation,
//! kept tidy by an [`ExpirySweeper`].
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **Two Expiry Kinds**: expire-after-write and expire-after-access
//! - **Lazy Expiry**: expired entries are dropped on access
//! - **Active Expiry**: a background sweeper drops entries nobody touches
//!
//! ## Example
//!
//! ```
//! use stashkv::cache::{CacheProvider, CacheTtl, MemoryCache};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let cache = MemoryCache::new();
//! cache.set("users:42", Bytes::from("ada"), CacheTtl::after_access(Duration::from_secs(60)));
//! assert_eq!(cache.get("users:42"), Some(Bytes::from("ada")));
//!
//! cache.delete("users:42");
//! assert_eq!(cache.get("users:42"), None);
//! ```

pub mod expiry;
pub mod memory;
pub mod provider;

pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use memory::{CacheEntry, CacheStats, MemoryCache};
pub use provider::{CachePolicy, CacheProvider, CacheTtl};
