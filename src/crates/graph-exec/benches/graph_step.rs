use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graph_exec::{compile, GraphExecutor, NodeBehavior, ToolNode};
use runtime_types::graph::END;
use runtime_types::{Edge, Graph, GraphState, NodeKind};

struct NoopTool;

#[async_trait]
impl ToolNode for NoopTool {
    async fn execute(&self, _state: &mut GraphState) -> graph_exec::Result<()> {
        Ok(())
    }
}

fn linear_graph(stages: usize) -> Graph {
    let mut g = Graph::new("bench", "n0");
    for i in 0..stages {
        g.add_node(format!("n{i}"), NodeKind::Tool);
    }
    for i in 0..stages - 1 {
        g.add_edge(Edge::always(format!("n{i}"), format!("n{}", i + 1)));
    }
    g.add_edge(Edge::always(format!("n{}", stages - 1), END));
    g
}

fn step_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("graph step, no store, 5 nodes", |b| {
        b.to_async(&runtime).iter(|| async {
            let graph = linear_graph(5);
            let compiled = compile(graph).unwrap();
            let mut nodes = HashMap::new();
            for i in 0..5 {
                nodes.insert(format!("n{i}"), NodeBehavior::Tool(Arc::new(NoopTool) as Arc<dyn ToolNode>));
            }
            let executor = GraphExecutor::new(compiled, nodes);
            executor.run("bench-run", "bench-session", black_box("input")).await.unwrap();
        });
    });
}

criterion_group!(benches, step_benchmark);
criterion_main!(benches);
