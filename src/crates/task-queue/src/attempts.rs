//! Attempt-record storage (§3 "Attempt record"): kept logically alongside
//! run/checkpoint state but physically distinct, per the data model's
//! explicit allowance. A worker that crashes mid-attempt leaves a `started`
//! record a later worker can discover and count past.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use runtime_types::{AttemptRecord, AttemptStatus};

use crate::error::{QueueError, Result};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn record_started(&self, record: AttemptRecord) -> Result<()>;
    async fn close(&self, run_id: &str, attempt: u32, status: AttemptStatus, ended_at: DateTime<Utc>, error: Option<String>) -> Result<()>;
    async fn list_for_run(&self, run_id: &str) -> Result<Vec<AttemptRecord>>;
}

/// Reference `AttemptStore` over a `DashMap`, one `Vec<AttemptRecord>` per
/// run, ordered by attempt number.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    records: DashMap<String, Vec<AttemptRecord>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn record_started(&self, record: AttemptRecord) -> Result<()> {
        self.records.entry(record.run_id.clone()).or_default().push(record);
        Ok(())
    }

    async fn close(&self, run_id: &str, attempt: u32, status: AttemptStatus, ended_at: DateTime<Utc>, error: Option<String>) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(run_id)
            .ok_or_else(|| QueueError::not_found(format!("no attempt records for run {run_id}")))?;
        let record = entry
            .iter_mut()
            .find(|r| r.attempt == attempt)
            .ok_or_else(|| QueueError::not_found(format!("attempt {attempt} for run {run_id}")))?;
        record.status = status;
        record.ended_at = Some(ended_at);
        record.error = error;
        Ok(())
    }

    async fn list_for_run(&self, run_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self.records.get(run_id).map(|v| v.clone()).unwrap_or_default())
    }
}
