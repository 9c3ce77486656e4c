//! The execution loop and resume (§4.1).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use runtime_types::{
    graph::{GraphStateSnapshot, END},
    Checkpoint, Event, EventKind, EventStatus, EventSink, GraphState, NoopSink, Run, RunStatus,
};
use state_store::StateStore;
use tracing::{debug, error, info};

use crate::compile::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::nodes::NodeBehavior;

/// The outcome of `Run`/`Resume`: the resolved output and the final run
/// record as persisted.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub run: Run,
}

/// Drives one compiled graph for one run. Node bodies are supplied by the
/// caller (`nodes`, keyed by node id) since the graph structure itself is
/// behavior-agnostic.
pub struct GraphExecutor {
    compiled: CompiledGraph,
    nodes: HashMap<String, NodeBehavior>,
    store: Option<Arc<dyn StateStore>>,
    sink: Arc<dyn EventSink>,
}

impl GraphExecutor {
    pub fn new(compiled: CompiledGraph, nodes: HashMap<String, NodeBehavior>) -> Self {
        Self {
            compiled,
            nodes,
            store: None,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the graph from the start node for a fresh run.
    pub async fn run(&self, run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>) -> Result<ExecutionResult> {
        let run_id = run_id.into();
        let now = Utc::now();
        let state = GraphState::new(run_id.clone(), session_id.into(), input, now);
        let start = self.compiled.graph.start.clone();

        let mut run = Run::new(state.run_id.clone(), state.session_id.clone(), state.input.clone(), now);
        run.status = RunStatus::Running;
        self.persist_run(run).await?;
        self.emit(Event::new(EventKind::Run, EventStatus::Started, "run.started").with_run(&run_id)).await;

        self.drive(state, start, 1).await
    }

    /// Resume a run from its latest checkpoint. Per §9's resolved open
    /// question, a completed run is NOT re-executed — its persisted output
    /// is returned directly.
    pub async fn resume(&self, run_id: impl Into<String>) -> Result<ExecutionResult> {
        let run_id = run_id.into();
        let store = self.store.as_ref().ok_or_else(|| GraphError::Fatal("resume requires a state store".to_string()))?;

        let run = store.load_run(&run_id).await.map_err(|e| {
            if e.is_not_found() {
                GraphError::RunNotFound(run_id.clone())
            } else {
                GraphError::Store(e)
            }
        })?;

        if run.status == RunStatus::Completed {
            let snapshot = store.load_latest_checkpoint(&run_id).await;
            let output = match snapshot {
                Ok(cp) => serde_json::from_value::<GraphStateSnapshot>(cp.state).map(|s| s.state.resolve_output()).unwrap_or_else(|_| run.output.clone()),
                Err(_) => run.output.clone(),
            };
            return Ok(ExecutionResult { output, run });
        }

        let latest = store.load_latest_checkpoint(&run_id).await.map_err(GraphError::Store)?;
        let snapshot: GraphStateSnapshot = serde_json::from_value(latest.state.clone())?;
        let next = match snapshot.next_node_id.clone() {
            Some(next_node) => next_node,
            None => self.select_next(&snapshot.state, &latest.node_id)?.unwrap_or_else(|| END.to_string()),
        };

        self.drive(snapshot.state, next, latest.seq + 1).await
    }

    async fn drive(&self, mut state: GraphState, mut current: String, mut seq: u64) -> Result<ExecutionResult> {
        loop {
            if current == END {
                break;
            }

            self.emit(Event::new(EventKind::Graph, EventStatus::Started, "graph.node.started").with_run(&state.run_id).with_attr("node_id", &current))
                .await;

            let step_result = self.execute_node(&current, &mut state).await;

            if let Err(err) = step_result {
                error!(node = %current, error = %err, "node execution failed");
                let mut run = Run::new(state.run_id.clone(), state.session_id.clone(), state.input.clone(), Utc::now());
                run.status = RunStatus::Failed;
                run.error = err.to_string();
                run.completed_at = Some(Utc::now());
                self.persist_run(run.clone()).await.ok();
                return Err(err);
            }

            state.last_node_id = Some(current.clone());
            state.updated_at = Utc::now();

            let next = self.select_next(&state, &current)?;

            if let Some(store) = &self.store {
                let snapshot = GraphStateSnapshot {
                    state: state.clone(),
                    next_node_id: next.clone(),
                };
                let checkpoint = Checkpoint::new(state.run_id.clone(), seq, current.clone(), serde_json::to_value(&snapshot)?, Utc::now());
                match store.save_checkpoint(checkpoint).await {
                    Ok(()) => {}
                    Err(e) if e.is_conflict() => {
                        debug!(run_id = %state.run_id, seq, "checkpoint already committed, treating as success");
                    }
                    Err(e) => return Err(GraphError::Store(e)),
                }
            }

            self.emit(Event::new(EventKind::Graph, EventStatus::Completed, "graph.node.completed").with_run(&state.run_id).with_attr("node_id", &current))
                .await;

            seq += 1;
            match next {
                Some(next_node) if next_node != END => current = next_node,
                _ => break,
            }
        }

        let output = state.resolve_output();
        let mut run = Run::new(state.run_id.clone(), state.session_id.clone(), state.input.clone(), state.updated_at);
        run.status = RunStatus::Completed;
        run.output = output.clone();
        run.completed_at = Some(Utc::now());
        self.persist_run(run.clone()).await?;
        self.emit(Event::new(EventKind::Run, EventStatus::Completed, "run.completed").with_run(&state.run_id)).await;

        Ok(ExecutionResult { output, run })
    }

    async fn execute_node(&self, node_id: &str, state: &mut GraphState) -> Result<()> {
        let behavior = self.nodes.get(node_id).ok_or_else(|| GraphError::Fatal(format!("no behavior registered for node {node_id}")))?;
        match behavior {
            NodeBehavior::Tool(tool) => tool.execute(state).await,
            NodeBehavior::Agent(agent) => agent.execute(state).await,
            NodeBehavior::Router(router) => {
                let route = router.route(state).await?;
                state.data.insert("route".to_string(), serde_json::json!(route));
                Ok(())
            }
        }
    }

    /// First edge from `node_id` (in declared order) whose condition
    /// matches. `None` means no edge matched and the run terminates.
    fn select_next(&self, state: &GraphState, node_id: &str) -> Result<Option<String>> {
        for edge in self.compiled.graph.edges_from(node_id) {
            if edge.condition.matches(&state.data) {
                return Ok(Some(edge.to.clone()));
            }
        }
        Ok(None)
    }

    async fn persist_run(&self, run: Run) -> Result<()> {
        if let Some(store) = &self.store {
            store.save_run(run).await.map_err(GraphError::Store)?;
        }
        Ok(())
    }

    async fn emit(&self, event: Event) {
        self.sink.emit(event).await;
    }
}

trait EventExt {
    fn with_run(self, run_id: &str) -> Self;
    fn with_attr(self, key: &str, value: &str) -> Self;
}

impl EventExt for Event {
    fn with_run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), serde_json::json!(value));
        self
    }
}
