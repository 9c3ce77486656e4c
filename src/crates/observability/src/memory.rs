//! In-memory reference `EventStore`, used in tests and single-process
//! deployments without a live database. Mirrors `state_store::memory`'s
//! shape: a full implementation over a lock-guarded `Vec`, not a stub.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use runtime_types::{Event, EventSink};
use tracing::warn;

use crate::error::Result;
use crate::store::{accumulate, Aggregation, EventStore};

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn list_by_run(&self, run_id: &str, limit: usize) -> Result<Vec<Event>> {
        let mut matches: Vec<Event> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.run_id.as_deref() == Some(run_id))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(limit.max(1));
        Ok(matches)
    }

    async fn list_by_session(&self, session_id: &str, limit: usize) -> Result<Vec<Event>> {
        let mut matches: Vec<Event> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(limit.max(1));
        Ok(matches)
    }

    async fn aggregate(&self, since: Option<DateTime<Utc>>) -> Result<Aggregation> {
        let mut agg = Aggregation::default();
        for event in self.events.lock().iter() {
            if since.map(|s| event.timestamp >= s).unwrap_or(true) {
                accumulate(&mut agg, event.kind, event.status);
            }
        }
        Ok(agg)
    }
}

/// Lets an `InMemoryEventStore` serve directly as an `AsyncSink`'s downstream.
#[async_trait]
impl EventSink for InMemoryEventStore {
    async fn emit(&self, event: Event) {
        if let Err(e) = EventStore::append(self, event).await {
            warn!(error = %e, "failed to persist event");
        }
    }
}
