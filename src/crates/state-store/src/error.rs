//! Error taxonomy for state store operations.

use thiserror::Error;

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors a state store backend can return. Variants map onto the core's
/// shared taxonomy (NotFound, Conflict, Transient, Fatal); `kind()` exposes
/// that classification to callers that branch on it (e.g. the queue worker
/// deciding whether a store failure is retriable).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested run or checkpoint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write collided with an existing record (duplicate checkpoint seq,
    /// or a lost compare-and-delete on a lock).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A transport or dependency I/O failure; safe to retry.
    #[error("transient storage error: {0}")]
    Transient(String),

    /// A programmer error or unrecoverable condition (corrupt checkpoint
    /// JSON, missing required field).
    #[error("fatal storage error: {0}")]
    Fatal(String),

    /// The operation is not supported by this backend (e.g. locks against
    /// a single-process in-memory store with no distributed mode).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(context: impl Into<String>) -> Self {
        StoreError::NotFound(context.into())
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        StoreError::Conflict(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Whether the call that produced this error is worth retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Sql(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
