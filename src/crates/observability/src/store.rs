//! The persistent side of §4.5: an append-only log of normalized events,
//! queryable by run, by session, and as a time-windowed aggregate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runtime_types::{Event, EventKind, EventStatus};

use crate::error::Result;

/// Counts a caller can use for a dashboard or alert without replaying the
/// raw event log itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
}

/// An append-only event log, indexed (logically, if not physically) by
/// `run_id`, `session_id`, and `timestamp desc`.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event) -> Result<()>;

    /// Most recent first.
    async fn list_by_run(&self, run_id: &str, limit: usize) -> Result<Vec<Event>>;

    /// Most recent first.
    async fn list_by_session(&self, session_id: &str, limit: usize) -> Result<Vec<Event>>;

    /// Aggregate counts over events with `timestamp >= since` (all events if
    /// `since` is `None`).
    async fn aggregate(&self, since: Option<DateTime<Utc>>) -> Result<Aggregation>;
}

/// Fold one `(kind, status)` pair into a running [`Aggregation`]. Shared by
/// every `EventStore` implementation so the counting rule lives in one
/// place.
pub fn accumulate(agg: &mut Aggregation, kind: EventKind, status: EventStatus) {
    use EventKind::*;
    use EventStatus::*;
    match (kind, status) {
        (Run, Started) => agg.runs_started += 1,
        (Run, Completed) => agg.runs_completed += 1,
        (Run, Failed) => agg.runs_failed += 1,
        (Provider, Started) => agg.provider_calls += 1,
        (Provider, Failed) => agg.provider_failures += 1,
        (Tool, Started) => agg.tool_calls += 1,
        (Tool, Failed) => agg.tool_failures += 1,
        _ => {}
    }
}
