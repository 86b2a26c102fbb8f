//! Index Engine Module
//!
//! The reference backend: entries are records in a full-text index. Each
//! record is addressed by a unique `entry_id` term, carries the stored
//! payload, and (for documents) typed projections of every scalar field.
//!
//! ## Layout
//!
//! - `config`: [`IndexConfig`], location and commit policy
//! - `schema`: the fixed record schema
//! - `encode`: document scalars to typed terms, [`FieldMatch`]
//! - `core`: writer, reader and the uncommitted overlay
//! - `commit`: the background commit task for async mode
//! - `engine`: [`IndexKvStore`] and [`IndexDocStore`]
//! - `manager`: [`IndexManager`], named indexes under one root

pub mod commit;
pub mod config;
pub mod core;
pub mod encode;
pub mod engine;
pub mod manager;
pub mod schema;

pub use config::{CommitMode, IndexConfig, IndexLocation};
pub use encode::FieldMatch;
pub use engine::{IndexDocStore, IndexHandle, IndexKvStore};
pub use manager::{IndexFlavor, IndexManager};
