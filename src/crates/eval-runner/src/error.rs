//! Error taxonomy for dataset loading and evaluation configuration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error reading dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed case on line {line}: {source}")]
    MalformedCase {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl EvalError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EvalError::Validation(_))
    }
}
