//! The queue wire contract (§6.2): at-least-once delivery with explicit
//! ack/nack/requeue and a dead-letter side-stream. Transport-agnostic —
//! [`crate::memory::InMemoryQueue`] and [`crate::redis::RedisQueue`] both
//! implement this against their own storage.

use async_trait::async_trait;
use runtime_types::{Delivery, Task};
use std::time::Duration;

use crate::error::Result;

/// Aggregate queue depth, as surfaced by `Stats()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub stream_length: u64,
    pub pending: u64,
    pub dlq_length: u64,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a task, returning the id of the message it was written as.
    async fn enqueue(&self, task: Task) -> Result<String>;

    /// Claim up to `count` deliveries for `consumer`, blocking up to `block`
    /// for at least one to become available. Claimed deliveries are
    /// invisible to other consumers until acked, nacked, or their
    /// visibility timeout expires.
    async fn claim(&self, consumer: &str, block: Duration, count: usize) -> Result<Vec<Delivery>>;

    /// Acknowledge successful processing, removing the deliveries from the
    /// pending set permanently.
    async fn ack(&self, consumer: &str, ids: &[String]) -> Result<()>;

    /// Return deliveries to the claimable set immediately (no backoff).
    async fn nack(&self, consumer: &str, deliveries: &[Delivery], reason: &str) -> Result<()>;

    /// Enqueue a new copy of `task` (already incremented by the caller) and
    /// implicitly ack the delivery it replaces; `delay` postpones its
    /// visibility.
    async fn requeue(&self, task: Task, reason: &str, delay: Duration) -> Result<String>;

    /// Move a delivery to the dead-letter stream, returning its id there.
    async fn dead_letter(&self, delivery: Delivery, reason: &str) -> Result<String>;

    /// List up to `limit` dead-lettered deliveries, most recent first.
    async fn list_dlq(&self, limit: usize) -> Result<Vec<Delivery>>;

    async fn stats(&self) -> Result<QueueStats>;
}
