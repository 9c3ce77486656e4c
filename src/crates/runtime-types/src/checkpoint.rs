//! A resumable snapshot of graph execution at one step boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity is the pair `(run_id, seq)`. `seq` starts at 1 and increases by
/// exactly 1 per committed step; two checkpoints for the same run never
/// share a `seq`, and a store must reject a duplicate `(run_id, seq)` write
/// with a conflict rather than silently overwriting it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: String,
    pub seq: u64,
    /// The node that just completed to produce this checkpoint.
    pub node_id: String,
    /// Opaque snapshot: the full graph state plus the already-selected next
    /// node id, stored as `GraphState` serialized into this JSON value so
    /// the store never needs to understand node-kind-specific shape.
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, seq: u64, node_id: impl Into<String>, state: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            node_id: node_id.into(),
            state,
            created_at: now,
        }
    }
}
