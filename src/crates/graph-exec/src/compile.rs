//! Compile-time validation (§4.1): non-empty, start exists, every edge
//! endpoint exists, every node reachable from start, no cycles unless
//! `allow_cycles`. Cycle detection is three-color DFS; reachability is BFS.

use std::collections::{HashSet, VecDeque};

use runtime_types::Graph;

use crate::error::{GraphError, Result};

/// A graph that has passed every §4.1 compile-time check. Only a
/// `CompiledGraph` can be executed.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Graph,
}

/// Validate and wrap `graph`, rejecting: empty graph, missing start, unknown
/// start, dangling edge endpoint, unreachable node, or a cycle when
/// `allow_cycles = false`.
pub fn compile(graph: Graph) -> Result<CompiledGraph> {
    if graph.nodes.is_empty() {
        return Err(GraphError::Validation("graph has no nodes".to_string()));
    }
    if !graph.nodes.contains_key(&graph.start) {
        return Err(GraphError::Validation(format!("start node {} does not exist", graph.start)));
    }

    for edge in &graph.edges {
        if !graph.nodes.contains_key(&edge.from) {
            return Err(GraphError::Validation(format!("edge source {} does not exist", edge.from)));
        }
        if edge.to != runtime_types::graph::END && !graph.nodes.contains_key(&edge.to) {
            return Err(GraphError::Validation(format!("edge target {} does not exist", edge.to)));
        }
    }

    check_reachability(&graph)?;
    if !graph.allow_cycles && has_cycle(&graph) {
        return Err(GraphError::Validation("graph contains a cycle but allow_cycles is false".to_string()));
    }

    Ok(CompiledGraph { graph })
}

fn check_reachability(graph: &Graph) -> Result<()> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(graph.start.as_str());
    visited.insert(graph.start.as_str());

    while let Some(node_id) = queue.pop_front() {
        for edge in graph.edges_from(node_id) {
            if edge.to == runtime_types::graph::END {
                continue;
            }
            if visited.insert(edge.to.as_str()) {
                queue.push_back(edge.to.as_str());
            }
        }
    }

    for node_id in graph.nodes.keys() {
        if !visited.contains(node_id.as_str()) {
            return Err(GraphError::Validation(format!("node {node_id} is unreachable from start")));
        }
    }
    Ok(())
}

/// Three-color DFS: white (unvisited) is implicit, gray is `in_stack`, black
/// is `visited`. A back-edge into a gray node is a cycle.
fn has_cycle(graph: &Graph) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    for node_id in graph.nodes.keys() {
        if dfs_cycle_check(graph, node_id, &mut visited, &mut in_stack) {
            return true;
        }
    }
    false
}

fn dfs_cycle_check<'a>(graph: &'a Graph, node_id: &'a str, visited: &mut HashSet<&'a str>, in_stack: &mut HashSet<&'a str>) -> bool {
    if in_stack.contains(node_id) {
        return true;
    }
    if visited.contains(node_id) {
        return false;
    }

    visited.insert(node_id);
    in_stack.insert(node_id);

    for edge in graph.edges_from(node_id) {
        if edge.to == runtime_types::graph::END {
            continue;
        }
        if dfs_cycle_check(graph, edge.to.as_str(), visited, in_stack) {
            return true;
        }
    }

    in_stack.remove(node_id);
    false
}
