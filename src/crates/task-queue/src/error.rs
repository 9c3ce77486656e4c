//! Error taxonomy for queue and coordinator operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors a [`crate::backend::QueueBackend`] or [`crate::coordinator::Coordinator`]
/// can return. Mirrors the shared taxonomy (`NotFound`, `Conflict`, `Transient`,
/// `Fatal`) the other crates follow, plus the queue-specific `Unsupported` for
/// backends that don't implement a given operation.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient queue error: {0}")]
    Transient(String),

    #[error("fatal queue error: {0}")]
    Fatal(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("state store error: {0}")]
    Store(#[from] state_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl QueueError {
    pub fn not_found(context: impl Into<String>) -> Self {
        QueueError::NotFound(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound(_))
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, QueueError::Transient(_) | QueueError::Redis(_))
    }
}
