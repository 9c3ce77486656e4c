//! Directed graph executor (§4.1): compile-time validation, node dispatch,
//! checkpoint-driven execution and resume.

pub mod compile;
pub mod error;
pub mod executor;
pub mod nodes;

pub use compile::{compile, CompiledGraph};
pub use error::{GraphError, Result};
pub use executor::{ExecutionResult, GraphExecutor};
pub use nodes::{AgentNode, NodeBehavior, RouterNode, ToolNode};
