//! Storage backend traits.
//!
//! `DurableBackend` is the source of truth; `CacheBackend` is a best-effort
//! accelerator. [`crate::hybrid::HybridStore`] composes one of each into the
//! read-through/write-through policy the state store is specified to have.
//! A backend that also wants to serve as the whole store (tests, single
//! process deployments) implements [`StateStore`] directly.

use async_trait::async_trait;
use runtime_types::{Checkpoint, Run};

use crate::error::Result;

/// Filter for `ListRuns`: both fields are optional narrowings, `None` means
/// unfiltered on that dimension.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub session_id: Option<String>,
    pub status: Option<runtime_types::RunStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl RunFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_status(mut self, status: runtime_types::RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Aggregate counts surfaced by `Stats()` — an operability view, not part of
/// the correctness contract.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_runs: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
}

/// The durable tier of the hybrid store: every write here must succeed for
/// the overall call to succeed. Also the tier `ListRuns`/`ListCheckpoints`
/// are served from exclusively, since only it has authoritative ordering.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    async fn save_run(&self, run: Run) -> Result<()>;
    async fn load_run(&self, run_id: &str) -> Result<Run>;
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>>;
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn load_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint>;
    async fn list_checkpoints(&self, run_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;
    async fn stats(&self) -> Result<StoreStats>;

    /// Set-if-absent lock acquisition with a TTL. Returns `Ok(true)` if
    /// acquired, `Ok(false)` if another owner already holds it.
    async fn acquire_run_lock(&self, run_id: &str, owner: &str, ttl: std::time::Duration) -> Result<bool>;
    /// Compare-and-delete: removes the lock only if `owner` still matches.
    async fn release_run_lock(&self, run_id: &str, owner: &str) -> Result<()>;
    /// Extend a held lock's TTL if `owner` still matches; unlike
    /// `acquire_run_lock` this succeeds against a lock the caller already
    /// holds rather than only an absent one. Returns `Ok(false)` if another
    /// owner holds it or it already expired — the caller (a worker
    /// heartbeat) should treat that as having lost the lock.
    async fn renew_run_lock(&self, run_id: &str, owner: &str, ttl: std::time::Duration) -> Result<bool>;
}

/// The cache tier: a best-effort mirror. Any failure here is logged by the
/// hybrid store and treated as a miss, never surfaced to the caller.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_run(&self, run_id: &str) -> Result<Run>;
    async fn put_run(&self, run: Run) -> Result<()>;
    async fn get_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint>;
    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;
}

/// The full state store contract (§4.2) as consumed by the rest of the
/// workspace. [`crate::hybrid::HybridStore`] is the production implementation;
/// a bare `DurableBackend` also satisfies this when used standalone in tests
/// via the blanket helper in that module.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_run(&self, run: Run) -> Result<()>;
    async fn load_run(&self, run_id: &str) -> Result<Run>;
    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>>;
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn load_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint>;
    async fn list_checkpoints(&self, run_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;
    async fn stats(&self) -> Result<StoreStats>;
    async fn acquire_run_lock(&self, run_id: &str, owner: &str, ttl: std::time::Duration) -> Result<bool>;
    async fn release_run_lock(&self, run_id: &str, owner: &str) -> Result<()>;
    async fn renew_run_lock(&self, run_id: &str, owner: &str, ttl: std::time::Duration) -> Result<bool>;
}
