//! Shared data model for the agent-run core.
//!
//! This crate has no behavior of its own — it defines the wire/storage
//! shapes that `state-store`, `graph-exec`, `task-queue`, `eval-runner`, and
//! `observability` all exchange, plus the invariants each type documents in
//! its own doc comment. Keeping the model in its own leaf crate means none
//! of the behavioral crates need to depend on each other just to talk about
//! a `Run`.

pub mod checkpoint;
pub mod event;
pub mod graph;
pub mod run;
pub mod runner;
pub mod sink;
pub mod task;

pub use checkpoint::Checkpoint;
pub use event::{Event, EventKind, EventStatus};
pub use graph::{Edge, EdgeCondition, Graph, GraphState, GraphStateSnapshot, NodeKind, NodeSpec};
pub use run::{Message, Run, RunStatus, Usage};
pub use runner::{RunResult, Runner, RunnerError};
pub use sink::{EventSink, NoopSink};
pub use task::{AttemptRecord, AttemptStatus, Delivery, Task};
