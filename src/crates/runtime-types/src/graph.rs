//! The static graph definition and the mutable state threaded through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The reserved id of a graph's single entry point.
pub const START: &str = "__start__";
/// A pseudo node-id meaning "no further edge matched, the run terminates".
pub const END: &str = "__end__";

/// The three node kinds a graph can be built from. Execution behavior for
/// each kind lives in `graph-exec`; this is only the tag persisted with the
/// graph definition and checkpoints for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Pure transformation of graph state; may read/write `data` and
    /// `output`. Must not itself persist checkpoints.
    Tool,
    /// Invokes an external `Runner` with an input derived from state via a
    /// caller-supplied projector. The returned output becomes
    /// `state.output`.
    Agent,
    /// Computes a string value stored under `state.data["route"]`.
    Router,
}

/// A node's static identity and kind within a [`Graph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub kind: NodeKind,
}

/// A condition gating whether an [`Edge`] may be taken. `Always` matches
/// unconditionally — an edge with no condition is equivalent to always true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EdgeCondition {
    Always,
    /// Matches iff `state.data[key] == value` (string comparison), the
    /// mechanism a Router node's output is consumed by.
    RouteEquals { key: String, value: String },
}

impl EdgeCondition {
    /// Evaluate this condition against a graph state's `data` map.
    pub fn matches(&self, data: &HashMap<String, serde_json::Value>) -> bool {
        match self {
            EdgeCondition::Always => true,
            EdgeCondition::RouteEquals { key, value } => data
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s == value)
                .unwrap_or(false),
        }
    }
}

/// A directed edge between two nodes, optionally gated by a condition.
/// Edges sharing a `from` node are evaluated in the order they were added
/// to the [`Graph`] — the first matching edge wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: EdgeCondition,
}

impl Edge {
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    pub fn route_equals(from: impl Into<String>, to: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::RouteEquals {
                key: key.into(),
                value: value.into(),
            },
        }
    }
}

/// A named, directed node graph. Compile-time invariants (non-empty, start
/// exists, every edge endpoint exists, every node reachable from start, no
/// cycles unless `allow_cycles`) are enforced by `graph-exec::compile`, not
/// here — this type only holds the declared structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub name: String,
    pub nodes: HashMap<String, NodeSpec>,
    pub edges: Vec<Edge>,
    pub start: String,
    #[serde(default)]
    pub allow_cycles: bool,
}

impl Graph {
    pub fn new(name: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            start: start.into(),
            allow_cycles: false,
        }
    }

    pub fn add_node(&mut self, id: impl Into<String>, kind: NodeKind) -> &mut Self {
        let id = id.into();
        self.nodes.insert(id.clone(), NodeSpec { id, kind });
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Edges leaving `node_id`, in declared insertion order.
    pub fn edges_from<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from == node_id)
    }
}

/// The mutable value passed between nodes within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    pub run_id: String,
    pub session_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphState {
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            input: input.into(),
            output: String::new(),
            last_node_id: None,
            data: HashMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Resolve the final output per the executor's finalize rule: prefer
    /// `state.output`, falling back to `state.data["output"]` if present.
    pub fn resolve_output(&self) -> String {
        if !self.output.is_empty() {
            return self.output.clone();
        }
        self.data
            .get("output")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}

/// What a checkpoint's opaque `state` JSON actually contains: the graph
/// state plus the next node id already selected for it, so resume can
/// honor the selection verbatim without re-evaluating edge conditions that
/// already fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStateSnapshot {
    pub state: GraphState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
}
