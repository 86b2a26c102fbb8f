//! Index engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default background commit interval (1s).
pub const DEFAULT_COMMIT_INTERVAL_MS: u64 = 1_000;

/// Default writer heap budget, shared by all writer threads.
pub const DEFAULT_WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Where the index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    /// A directory on disk, created if missing
    Directory(PathBuf),
    /// RAM only; everything is lost when the engine is dropped
    Memory,
}

/// When writes become durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Commit after every put/delete, before the callback runs
    #[default]
    Sync,
    /// Commit periodically on a background task
    Async,
}

impl std::str::FromStr for CommitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(CommitMode::Sync),
            "async" => Ok(CommitMode::Async),
            other => Err(format!("unknown commit mode: {}", other)),
        }
    }
}

/// Configuration for an index engine.
///
/// # Example
///
/// ```
/// use stashkv::index::{CommitMode, IndexConfig};
///
/// let config = IndexConfig::in_dir("/tmp/stashkv/users").with_async_commit(500);
/// assert_eq!(config.commit_mode, CommitMode::Async);
/// ```
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub location: IndexLocation,
    pub commit_mode: CommitMode,
    /// Background commit period in milliseconds; must be > 0 in async mode
    pub commit_interval_ms: u64,
    /// Writer heap budget in bytes
    pub writer_memory_bytes: usize,
    /// Number of indexing threads
    pub writer_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            location: IndexLocation::Memory,
            commit_mode: CommitMode::Sync,
            commit_interval_ms: DEFAULT_COMMIT_INTERVAL_MS,
            writer_memory_bytes: DEFAULT_WRITER_MEMORY_BYTES,
            writer_threads: 1,
        }
    }
}

impl IndexConfig {
    /// An on-disk index at `path`.
    pub fn in_dir(path: impl AsRef<Path>) -> Self {
        Self {
            location: IndexLocation::Directory(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// A RAM-only index.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the location.
    pub fn with_location(mut self, location: IndexLocation) -> Self {
        self.location = location;
        self
    }

    /// Set the commit mode.
    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    /// Set the background commit interval in milliseconds.
    pub fn with_commit_interval_ms(mut self, interval_ms: u64) -> Self {
        self.commit_interval_ms = interval_ms;
        self
    }

    /// Switch to async commits every `interval_ms`.
    pub fn with_async_commit(self, interval_ms: u64) -> Self {
        self.with_commit_mode(CommitMode::Async)
            .with_commit_interval_ms(interval_ms)
    }

    /// Set the writer heap budget.
    pub fn with_writer_memory(mut self, bytes: usize) -> Self {
        self.writer_memory_bytes = bytes;
        self
    }

    /// Set the number of indexing threads.
    pub fn with_writer_threads(mut self, threads: usize) -> Self {
        self.writer_threads = threads.max(1);
        self
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    /// The commit mode actually used.
    ///
    /// Async mode without a positive interval is a misconfiguration: it is
    /// logged and the engine commits synchronously instead.
    pub fn effective_commit_mode(&self) -> CommitMode {
        if self.commit_mode == CommitMode::Async && self.commit_interval_ms == 0 {
            warn!(
                location = ?self.location,
                "Async commit requested without a positive commit interval, committing synchronously"
            );
            return CommitMode::Sync;
        }
        self.commit_mode
    }
}
