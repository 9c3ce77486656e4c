//! Error taxonomy for the event sink and its persistent store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ObservabilityError>;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("fatal observability error: {0}")]
    Fatal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl ObservabilityError {
    pub fn not_found(context: impl Into<String>) -> Self {
        ObservabilityError::NotFound(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ObservabilityError::NotFound(_))
    }
}
