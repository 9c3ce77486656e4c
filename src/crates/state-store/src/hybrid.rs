//! The hybrid durable+cache composition (§4.2): writes fan out to durable
//! first and fail on durable error; cache writes are best-effort and only
//! logged on failure. Reads try cache first, fall back to durable on miss,
//! and backfill the cache best-effort. List operations bypass the cache
//! entirely since only durable has authoritative ordering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runtime_types::{Checkpoint, Run};
use tracing::warn;

use crate::error::Result;
use crate::traits::{CacheBackend, DurableBackend, RunFilter, StateStore, StoreStats};

/// Composes a durable backend (source of truth) with an optional cache
/// backend (best-effort accelerator). Constructing with `cache = None`
/// degrades gracefully to durable-only reads/writes.
pub struct HybridStore {
    durable: Arc<dyn DurableBackend>,
    cache: Option<Arc<dyn CacheBackend>>,
}

impl HybridStore {
    pub fn new(durable: Arc<dyn DurableBackend>, cache: Option<Arc<dyn CacheBackend>>) -> Self {
        Self { durable, cache }
    }

    pub fn durable_only(durable: Arc<dyn DurableBackend>) -> Self {
        Self::new(durable, None)
    }
}

#[async_trait]
impl StateStore for HybridStore {
    async fn save_run(&self, run: Run) -> Result<()> {
        self.durable.save_run(run.clone()).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_run(run).await {
                warn!(error = %e, "cache write-through for run failed, ignoring");
            }
        }
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Run> {
        if let Some(cache) = &self.cache {
            match cache.get_run(run_id).await {
                Ok(run) => return Ok(run),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(error = %e, "cache read for run failed, falling back to durable"),
            }
        }
        let run = self.durable.load_run(run_id).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_run(run.clone()).await {
                warn!(error = %e, "cache backfill for run failed, ignoring");
            }
        }
        Ok(run)
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        self.durable.list_runs(filter).await
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        self.durable.save_checkpoint(checkpoint.clone()).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_checkpoint(checkpoint).await {
                warn!(error = %e, "cache write-through for checkpoint failed, ignoring");
            }
        }
        Ok(())
    }

    async fn load_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint> {
        if let Some(cache) = &self.cache {
            match cache.get_latest_checkpoint(run_id).await {
                Ok(cp) => return Ok(cp),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(error = %e, "cache read for checkpoint failed, falling back to durable"),
            }
        }
        let cp = self.durable.load_latest_checkpoint(run_id).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_checkpoint(cp.clone()).await {
                warn!(error = %e, "cache backfill for checkpoint failed, ignoring");
            }
        }
        Ok(cp)
    }

    async fn list_checkpoints(&self, run_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        self.durable.list_checkpoints(run_id, limit).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.durable.stats().await
    }

    async fn acquire_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.durable.acquire_run_lock(run_id, owner, ttl).await
    }

    async fn release_run_lock(&self, run_id: &str, owner: &str) -> Result<()> {
        self.durable.release_run_lock(run_id, owner).await
    }

    async fn renew_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.durable.renew_run_lock(run_id, owner, ttl).await
    }
}
