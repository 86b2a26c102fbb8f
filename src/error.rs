//! Error types shared by every backend, the cache layer and the index engine.
//!
//! Absence is never an error: `get` returns `Ok(None)` for a missing entry.
//! Everything else funnels into [`StoreError`].

use thiserror::Error;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Plain filesystem I/O failure
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The index engine failed to read, write or commit
    #[error("index failure: {0}")]
    Index(#[from] tantivy::TantivyError),

    /// The index directory could not be opened
    #[error("index directory failure: {0}")]
    Directory(#[from] tantivy::directory::error::OpenDirectoryError),

    /// A stored payload could not be encoded or decoded
    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    /// A stored record is missing its payload or is otherwise unreadable
    #[error("corrupt index record: {0}")]
    Corrupt(String),

    /// The backend does not implement this operation
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// The space contains the identity separator
    #[error("invalid space {0:?}: spaces must not contain ':'")]
    InvalidSpace(String),

    /// A field search could not be built
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// An index name is not usable as a directory name
    #[error("invalid index name: {0:?}")]
    InvalidName(String),

    /// The engine has been closed
    #[error("index engine is closed")]
    Closed,
}

impl StoreError {
    /// Returns true for failures of the underlying storage (the I/O class).
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_)
                | StoreError::Index(_)
                | StoreError::Directory(_)
                | StoreError::Codec(_)
                | StoreError::Corrupt(_)
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_failure_classification() {
        let io = StoreError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_io_failure());
        assert!(!StoreError::Unsupported("get_mapped").is_io_failure());
        assert!(!StoreError::Closed.is_io_failure());
    }

    #[test]
    fn test_display_messages() {
        let err = StoreError::InvalidSpace("a:b".to_string());
        assert_eq!(
            err.to_string(),
            "invalid space \"a:b\": spaces must not contain ':'"
        );
        assert_eq!(
            StoreError::Unsupported("get_mapped").to_string(),
            "operation not supported by this backend: get_mapped"
        );
    }
}
