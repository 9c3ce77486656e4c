//! Error taxonomy for graph compilation and execution.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// All errors the executor can surface. `Validation` covers every compile-time
/// rejection (§4.1); `NodeExecution` is a node body's own error surfaced
/// verbatim, which is also persisted onto the run's `error` field.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph validation failed: {0}")]
    Validation(String),

    #[error("node {node} failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("run {0} not found")]
    RunNotFound(String),

    #[error("state store error: {0}")]
    Store(#[from] state_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        GraphError::NodeExecution {
            node: node.into(),
            source: Box::new(source),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GraphError::Validation(_))
    }
}
