//! In-memory reference backend: a full `DurableBackend` over `DashMap`s, used
//! in tests and single-process deployments without a live database. A
//! drop-in reference implementation alongside the real backend, not a stub.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use runtime_types::{Checkpoint, Run};

use crate::error::{Result, StoreError};
use crate::traits::{CacheBackend, DurableBackend, RunFilter, StoreStats};

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// Durable backend backed entirely by process memory. Checkpoints are kept
/// per run as a seq-ordered `BTreeMap` so `list_checkpoints` can walk them in
/// descending order cheaply.
#[derive(Default)]
pub struct InMemoryStore {
    runs: DashMap<String, Run>,
    checkpoints: DashMap<String, BTreeMap<u64, Checkpoint>>,
    locks: Mutex<std::collections::HashMap<String, LockEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableBackend for InMemoryStore {
    async fn save_run(&self, run: Run) -> Result<()> {
        let now = run.updated_at;
        self.runs
            .entry(run.run_id.clone())
            .and_modify(|existing| existing.merge_upsert(run.clone(), now))
            .or_insert(run);
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Run> {
        self.runs
            .get(run_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::not_found(format!("run {run_id}")))
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| filter.session_id.as_deref().map(|s| s == r.session_id).unwrap_or(true))
            .filter(|r| filter.status.map(|s| s == r.status).unwrap_or(true))
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let runs = runs
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.max(1))
            .collect();
        Ok(runs)
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut entry = self.checkpoints.entry(checkpoint.run_id.clone()).or_default();
        if entry.contains_key(&checkpoint.seq) {
            return Err(StoreError::conflict(format!(
                "checkpoint ({}, {}) already exists",
                checkpoint.run_id, checkpoint.seq
            )));
        }
        entry.insert(checkpoint.seq, checkpoint);
        Ok(())
    }

    async fn load_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint> {
        self.checkpoints
            .get(run_id)
            .and_then(|m| m.values().next_back().cloned())
            .ok_or_else(|| StoreError::not_found(format!("checkpoint for run {run_id}")))
    }

    async fn list_checkpoints(&self, run_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        Ok(self
            .checkpoints
            .get(run_id)
            .map(|m| m.values().rev().take(limit.max(1)).cloned().collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in self.runs.iter() {
            stats.total_runs += 1;
            use runtime_types::RunStatus::*;
            match entry.value().status {
                Queued => stats.queued += 1,
                Running => stats.running += 1,
                Completed => stats.completed += 1,
                Failed => stats.failed += 1,
                Canceled => stats.canceled += 1,
            }
        }
        Ok(stats)
    }

    async fn acquire_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut locks = self.locks.lock();
        let now = Instant::now();
        if let Some(existing) = locks.get(run_id) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        locks.insert(
            run_id.to_string(),
            LockEntry {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_run_lock(&self, run_id: &str, owner: &str) -> Result<()> {
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(run_id) {
            if existing.owner == owner {
                locks.remove(run_id);
            }
        }
        Ok(())
    }

    async fn renew_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut locks = self.locks.lock();
        match locks.get_mut(run_id) {
            Some(existing) if existing.owner == owner && existing.expires_at > Instant::now() => {
                existing.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory cache backend, used standalone in tests or as the cache tier of
/// a [`crate::hybrid::HybridStore`] in front of a real durable backend.
#[derive(Default)]
pub struct InMemoryCache {
    runs: DashMap<String, Run>,
    checkpoints: DashMap<String, Checkpoint>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get_run(&self, run_id: &str) -> Result<Run> {
        self.runs
            .get(run_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::not_found(format!("run {run_id}")))
    }

    async fn put_run(&self, run: Run) -> Result<()> {
        self.runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn get_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint> {
        self.checkpoints
            .get(run_id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::not_found(format!("checkpoint for run {run_id}")))
    }

    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        self.checkpoints.insert(checkpoint.run_id.clone(), checkpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn run(id: &str) -> Run {
        Run::new(id, "s1", "hi", Utc::now())
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryStore::new();
        store.save_run(run("r1")).await.unwrap();
        let loaded = store.load_run("r1").await.unwrap();
        assert_eq!(loaded.run_id, "r1");
    }

    #[tokio::test]
    async fn load_missing_run_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.load_run("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn duplicate_checkpoint_seq_conflicts() {
        let store = InMemoryStore::new();
        let cp = Checkpoint::new("r1", 1, "n1", serde_json::json!({}), Utc::now());
        store.save_checkpoint(cp.clone()).await.unwrap();
        let err = store.save_checkpoint(cp).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn latest_checkpoint_is_max_seq() {
        let store = InMemoryStore::new();
        for seq in 1..=3u64 {
            store
                .save_checkpoint(Checkpoint::new("r1", seq, "n", serde_json::json!({}), Utc::now()))
                .await
                .unwrap();
        }
        let latest = store.load_latest_checkpoint("r1").await.unwrap();
        assert_eq!(latest.seq, 3);
    }

    #[tokio::test]
    async fn lock_round_trip_matches_testable_property() {
        let store = InMemoryStore::new();
        assert!(store.acquire_run_lock("r1", "A", Duration::from_secs(10)).await.unwrap());
        assert!(!store.acquire_run_lock("r1", "B", Duration::from_secs(10)).await.unwrap());
        store.release_run_lock("r1", "B").await.unwrap(); // no-op, wrong owner
        assert!(!store.acquire_run_lock("r1", "C", Duration::from_secs(10)).await.unwrap());
        store.release_run_lock("r1", "A").await.unwrap();
        assert!(store.acquire_run_lock("r1", "D", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn renew_extends_ttl_only_for_the_current_owner() {
        let store = InMemoryStore::new();
        assert!(store.acquire_run_lock("r1", "A", Duration::from_millis(30)).await.unwrap());
        assert!(!store.renew_run_lock("r1", "B", Duration::from_secs(10)).await.unwrap());
        assert!(store.renew_run_lock("r1", "A", Duration::from_secs(10)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Renewed well past the original 30ms TTL, so another owner still can't claim it.
        assert!(!store.acquire_run_lock("r1", "B", Duration::from_secs(10)).await.unwrap());
    }
}
