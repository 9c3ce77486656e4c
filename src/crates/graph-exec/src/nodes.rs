//! Node execution contracts (§4.1). The graph structure is homogeneous —
//! `runtime_types::Graph` only tags a node's `kind` — but the three kinds
//! dispatch to different behavior, represented here as a tagged sum of
//! trait objects the caller registers per node id when building an
//! [`crate::executor::GraphExecutor`].

use std::sync::Arc;

use async_trait::async_trait;
use runtime_types::{GraphState, Runner};

use crate::error::Result;

/// A Tool node: pure transformation of graph state. May read/write `data`
/// and `output`; must not itself persist checkpoints (the executor owns
/// checkpointing).
#[async_trait]
pub trait ToolNode: Send + Sync {
    async fn execute(&self, state: &mut GraphState) -> Result<()>;
}

/// A Router node: computes a string stored under `state.data["route"]` for
/// subsequent `RouteEquals` edges to match against.
#[async_trait]
pub trait RouterNode: Send + Sync {
    async fn route(&self, state: &GraphState) -> Result<String>;
}

/// An Agent node: derives a `Runner` input from state via a projector,
/// invokes the runner, and writes its output back onto `state.output` (and,
/// if configured, a stash key in `state.data`).
pub struct AgentNode {
    pub runner: Arc<dyn Runner>,
    pub projector: Box<dyn Fn(&GraphState) -> String + Send + Sync>,
    pub output_key: Option<String>,
}

impl AgentNode {
    pub fn new(runner: Arc<dyn Runner>, projector: impl Fn(&GraphState) -> String + Send + Sync + 'static) -> Self {
        Self {
            runner,
            projector: Box::new(projector),
            output_key: None,
        }
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub(crate) async fn execute(&self, state: &mut GraphState) -> Result<()> {
        let input = (self.projector)(state);
        let result = self.runner.run(&input).await.map_err(|e| crate::error::GraphError::Fatal(e.to_string()))?;
        state.output = result.output.clone();
        if let Some(key) = &self.output_key {
            state.data.insert(key.clone(), serde_json::json!(result.output));
        }
        Ok(())
    }
}

/// Per-node behavior, one entry per node id in the compiled graph.
pub enum NodeBehavior {
    Tool(Arc<dyn ToolNode>),
    Agent(AgentNode),
    Router(Arc<dyn RouterNode>),
}
