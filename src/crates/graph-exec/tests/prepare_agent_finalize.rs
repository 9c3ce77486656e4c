use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use graph_exec::{compile, GraphExecutor, NodeBehavior, ToolNode};
use runtime_types::graph::END;
use runtime_types::{Edge, Graph, GraphState, NodeKind, RunResult, RunStatus, Runner, RunnerError};
use state_store::memory::InMemoryStore;
use state_store::{HybridStore, StateStore};

struct Prepare;

#[async_trait]
impl ToolNode for Prepare {
    async fn execute(&self, state: &mut GraphState) -> graph_exec::Result<()> {
        state.data.insert("prepared".to_string(), serde_json::json!(true));
        Ok(())
    }
}

struct Finalize;

#[async_trait]
impl ToolNode for Finalize {
    async fn execute(&self, state: &mut GraphState) -> graph_exec::Result<()> {
        state.output = state.output.trim().to_string();
        Ok(())
    }
}

struct StaticRunner;

#[async_trait]
impl Runner for StaticRunner {
    async fn run(&self, _input: &str) -> Result<RunResult, RunnerError> {
        Ok(RunResult::new(" ok "))
    }
}

fn build() -> (graph_exec::CompiledGraph, HashMap<String, NodeBehavior>) {
    let mut g = Graph::new("prepare_agent_finalize", "prepare");
    g.add_node("prepare", NodeKind::Tool);
    g.add_node("agent", NodeKind::Agent);
    g.add_node("finalize", NodeKind::Tool);
    g.add_edge(Edge::always("prepare", "agent"));
    g.add_edge(Edge::always("agent", "finalize"));
    g.add_edge(Edge::always("finalize", END));

    let compiled = compile(g).unwrap();

    let mut nodes = HashMap::new();
    nodes.insert("prepare".to_string(), NodeBehavior::Tool(Arc::new(Prepare)));
    nodes.insert(
        "agent".to_string(),
        NodeBehavior::Agent(graph_exec::AgentNode::new(Arc::new(StaticRunner), |s: &GraphState| s.input.clone())),
    );
    nodes.insert("finalize".to_string(), NodeBehavior::Tool(Arc::new(Finalize)));

    (compiled, nodes)
}

#[tokio::test]
async fn run_produces_ok_output_and_persists_completed_run() {
    let store: Arc<dyn StateStore> = Arc::new(HybridStore::durable_only(Arc::new(InMemoryStore::new())));
    let (compiled, nodes) = build();
    let executor = GraphExecutor::new(compiled, nodes).with_store(store.clone());

    let result = executor.run("run-prepare-agent-finalize", "session-1", "input").await.unwrap();
    assert_eq!(result.output, "ok");

    let persisted = store.load_run("run-prepare-agent-finalize").await.unwrap();
    assert_eq!(persisted.status, RunStatus::Completed);
    assert_eq!(persisted.output, "ok");
}

#[tokio::test]
async fn resume_returns_same_output_as_original_run() {
    let store: Arc<dyn StateStore> = Arc::new(HybridStore::durable_only(Arc::new(InMemoryStore::new())));
    let (compiled, nodes) = build();
    let executor = GraphExecutor::new(compiled, nodes).with_store(store.clone());

    let first = executor.run("run-resume", "session-1", "input").await.unwrap();
    let resumed = executor.resume("run-resume").await.unwrap();

    assert_eq!(resumed.output, first.output);
    assert_eq!(resumed.run.status, RunStatus::Completed);
}

#[tokio::test]
async fn resume_of_unknown_run_is_not_found() {
    let store: Arc<dyn StateStore> = Arc::new(HybridStore::durable_only(Arc::new(InMemoryStore::new())));
    let (compiled, nodes) = build();
    let executor = GraphExecutor::new(compiled, nodes).with_store(store);

    let err = executor.resume("does-not-exist").await.unwrap_err();
    assert!(matches!(err, graph_exec::GraphError::RunNotFound(_)));
}
