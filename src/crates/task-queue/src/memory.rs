//! In-memory reference `QueueBackend`, used in tests and single-process
//! deployments without a live Redis. Mirrors the state store's
//! `InMemoryStore` — a full implementation of the contract over `DashMap`s,
//! not a stub.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use runtime_types::{Delivery, Task};
use uuid::Uuid;

use crate::backend::{QueueBackend, QueueStats};
use crate::error::Result;

struct Entry {
    task: Task,
    received_at: chrono::DateTime<Utc>,
    claimed_by: Option<String>,
    /// When this entry next becomes claimable: immediately after enqueue (or
    /// a requeue delay), and `visibility_timeout` after each claim.
    available_at: Instant,
}

/// Durable-enough-for-tests queue backed entirely by process memory. A
/// single logical stream plus a separate dead-letter stream, both namespaced
/// under `prefix`.
pub struct InMemoryQueue {
    prefix: String,
    visibility_timeout: Duration,
    entries: DashMap<String, Entry>,
    order: Mutex<VecDeque<String>>,
    dlq: Mutex<VecDeque<Delivery>>,
}

impl InMemoryQueue {
    pub fn new(prefix: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            visibility_timeout,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            dlq: Mutex::new(VecDeque::new()),
        }
    }

    fn stream_name(&self) -> String {
        format!("{}:runs", self.prefix)
    }

    fn dlq_stream_name(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    fn remove(&self, id: &str) {
        self.entries.remove(id);
        self.order.lock().retain(|existing| existing != id);
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn enqueue(&self, task: Task) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.entries.insert(
            id.clone(),
            Entry {
                task,
                received_at: Utc::now(),
                claimed_by: None,
                available_at: Instant::now(),
            },
        );
        self.order.lock().push_back(id.clone());
        Ok(id)
    }

    async fn claim(&self, consumer: &str, block: Duration, count: usize) -> Result<Vec<Delivery>> {
        let deadline = Instant::now() + block;
        loop {
            let mut claimed = Vec::with_capacity(count);
            {
                let order = self.order.lock();
                for id in order.iter() {
                    if claimed.len() >= count {
                        break;
                    }
                    if let Some(mut entry) = self.entries.get_mut(id.as_str()) {
                        let now = Instant::now();
                        if entry.available_at <= now {
                            entry.claimed_by = Some(consumer.to_string());
                            entry.available_at = now + self.visibility_timeout;
                            claimed.push(Delivery {
                                message_id: id.clone(),
                                stream: self.stream_name(),
                                task: entry.task.clone(),
                                received_at: entry.received_at,
                            });
                        }
                    }
                }
            }

            if !claimed.is_empty() || Instant::now() >= deadline {
                return Ok(claimed);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn ack(&self, _consumer: &str, ids: &[String]) -> Result<()> {
        for id in ids {
            self.remove(id);
        }
        Ok(())
    }

    async fn nack(&self, _consumer: &str, deliveries: &[Delivery], _reason: &str) -> Result<()> {
        let now = Instant::now();
        for delivery in deliveries {
            if let Some(mut entry) = self.entries.get_mut(&delivery.message_id) {
                entry.claimed_by = None;
                entry.available_at = now;
            }
        }
        Ok(())
    }

    async fn requeue(&self, task: Task, _reason: &str, delay: Duration) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.entries.insert(
            id.clone(),
            Entry {
                task,
                received_at: Utc::now(),
                claimed_by: None,
                available_at: Instant::now() + delay,
            },
        );
        self.order.lock().push_back(id.clone());
        Ok(id)
    }

    async fn dead_letter(&self, delivery: Delivery, _reason: &str) -> Result<String> {
        self.remove(&delivery.message_id);
        let dlq_id = format!("dlq-{}", Uuid::new_v4());
        self.dlq.lock().push_front(Delivery {
            message_id: dlq_id.clone(),
            stream: self.dlq_stream_name(),
            task: delivery.task,
            received_at: Utc::now(),
        });
        Ok(dlq_id)
    }

    async fn list_dlq(&self, limit: usize) -> Result<Vec<Delivery>> {
        Ok(self.dlq.lock().iter().take(limit.max(1)).cloned().collect())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let now = Instant::now();
        let stream_length = self.entries.len() as u64;
        let pending = self.entries.iter().filter(|e| e.claimed_by.is_some() && e.available_at > now).count() as u64;
        Ok(QueueStats {
            stream_length,
            pending,
            dlq_length: self.dlq.lock().len() as u64,
        })
    }
}
