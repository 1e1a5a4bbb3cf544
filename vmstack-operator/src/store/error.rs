//! Store error types.

use thiserror::Error;

/// Errors returned by a [`ResourceStore`](super::ResourceStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Version mismatch (optimistic concurrency control).
    #[error("version conflict on {name}: expected {expected}, got {actual}")]
    VersionConflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether the write lost a race and may be retried against a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
