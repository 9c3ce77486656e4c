//! Redis Streams + consumer-group backed [`QueueBackend`] — the natural
//! mapping onto a log-structured pub/sub bus named in §6.2. The `redis`
//! crate has no high-level streams API for this shape (unlike its typed
//! `streams::StreamReadReply` for plain reads), so claim/ack/nack are built
//! directly against `XADD`/`XREADGROUP`/`XAUTOCLAIM`/`XACK`/`XPENDING`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use redis::{AsyncCommands, RedisResult, Value};
use runtime_types::{Delivery, Task};
use tracing::{debug, warn};

use crate::backend::{QueueBackend, QueueStats};
use crate::error::{QueueError, Result};

const FIELD_PAYLOAD: &str = "payload";

pub struct RedisQueue {
    manager: ConnectionManager,
    prefix: String,
    group: String,
    visibility_timeout: Duration,
}

impl RedisQueue {
    pub async fn connect(url: &str, prefix: impl Into<String>, group: impl Into<String>, visibility_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        let queue = Self {
            manager,
            prefix: prefix.into(),
            group: group.into(),
            visibility_timeout,
        };
        queue.ensure_group().await?;
        Ok(queue)
    }

    fn stream_key(&self) -> String {
        format!("{}:runs", self.prefix)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key())
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn xadd_task(&self, stream: &str, task: &Task) -> Result<String> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(task)?;
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(FIELD_PAYLOAD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    fn decode_entry(stream: &str, id: &str, fields: &HashMap<String, Value>) -> Result<Delivery> {
        let payload: String = fields
            .get(FIELD_PAYLOAD)
            .map(redis::from_redis_value)
            .transpose()
            .map_err(QueueError::from)?
            .ok_or_else(|| QueueError::Fatal(format!("stream entry {id} is missing field {FIELD_PAYLOAD}")))?;
        let task: Task = serde_json::from_str(&payload)?;
        Ok(Delivery {
            message_id: id.to_string(),
            stream: stream.to_string(),
            task,
            received_at: Utc::now(),
        })
    }

    /// Reclaim entries that have been pending longer than `visibility_timeout`
    /// — the Streams analogue of a visibility timeout expiring and handing
    /// the delivery to the next claimant.
    async fn autoclaim(&self, consumer: &str, count: usize) -> Result<Vec<Delivery>> {
        let mut conn = self.manager.clone();
        let reply: Value = redis::cmd("XAUTOCLAIM")
            .arg(self.stream_key())
            .arg(&self.group)
            .arg(consumer)
            .arg(self.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let Value::Array(parts) = reply else {
            return Ok(Vec::new());
        };
        // XAUTOCLAIM replies [next-cursor, claimed-entries, deleted-ids].
        let Some(Value::Array(entries)) = parts.into_iter().nth(1) else {
            return Ok(Vec::new());
        };

        let stream = self.stream_key();
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::Array(pair) = entry else { continue };
            let mut iter = pair.into_iter();
            let (Some(id_value), Some(Value::Array(field_values))) = (iter.next(), iter.next()) else {
                continue;
            };
            let id: String = redis::from_redis_value(&id_value).map_err(QueueError::from)?;
            let mut fields = HashMap::new();
            let mut chunks = field_values.into_iter();
            while let (Some(k), Some(v)) = (chunks.next(), chunks.next()) {
                let key: String = redis::from_redis_value(&k).map_err(QueueError::from)?;
                fields.insert(key, v);
            }
            match Self::decode_entry(&stream, &id, &fields) {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => warn!(id, error = %e, "dropping unparseable reclaimed stream entry"),
            }
        }
        Ok(deliveries)
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn enqueue(&self, task: Task) -> Result<String> {
        self.xadd_task(&self.stream_key(), &task).await
    }

    async fn claim(&self, consumer: &str, block: Duration, count: usize) -> Result<Vec<Delivery>> {
        let mut claimed = self.autoclaim(consumer, count).await?;
        if claimed.len() >= count {
            claimed.truncate(count);
            return Ok(claimed);
        }

        let mut conn = self.manager.clone();
        let remaining = count - claimed.len();
        let reply: RedisResult<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(consumer)
            .arg("COUNT")
            .arg(remaining)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(self.stream_key())
            .arg(">")
            .query_async(&mut conn)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) if e.kind() == redis::ErrorKind::ResponseError && e.to_string().contains("NOGROUP") => {
                self.ensure_group().await?;
                return Ok(claimed);
            }
            Err(e) => return Err(e.into()),
        };

        for key in reply.keys {
            for id in key.ids {
                match Self::decode_entry(&key.key, &id.id, &id.map) {
                    Ok(delivery) => claimed.push(delivery),
                    Err(e) => warn!(id = %id.id, error = %e, "dropping unparseable stream entry"),
                }
            }
        }

        debug!(consumer, claimed = claimed.len(), "claimed deliveries");
        Ok(claimed)
    }

    async fn ack(&self, _consumer: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: i64 = conn.xack(self.stream_key(), &self.group, ids).await.map_err(QueueError::from)?;
        Ok(())
    }

    async fn nack(&self, consumer: &str, deliveries: &[Delivery], reason: &str) -> Result<()> {
        debug!(consumer, reason, count = deliveries.len(), "nacking deliveries");
        let ids: Vec<String> = deliveries.iter().map(|d| d.message_id.clone()).collect();
        self.ack(consumer, &ids).await?;
        for delivery in deliveries {
            self.xadd_task(&self.stream_key(), &delivery.task).await?;
        }
        Ok(())
    }

    async fn requeue(&self, task: Task, reason: &str, delay: Duration) -> Result<String> {
        debug!(run_id = %task.run_id, attempt = task.attempt, reason, delay_ms = delay.as_millis() as u64, "requeueing task");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.xadd_task(&self.stream_key(), &task).await
    }

    async fn dead_letter(&self, delivery: Delivery, reason: &str) -> Result<String> {
        warn!(run_id = %delivery.task.run_id, reason, "dead-lettering delivery");
        self.ack("dead-letter", std::slice::from_ref(&delivery.message_id)).await?;
        self.xadd_task(&self.dlq_key(), &delivery.task).await
    }

    async fn list_dlq(&self, limit: usize) -> Result<Vec<Delivery>> {
        let mut conn = self.manager.clone();
        let entries: Vec<(String, HashMap<String, Value>)> = redis::cmd("XREVRANGE")
            .arg(self.dlq_key())
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(limit.max(1))
            .query_async(&mut conn)
            .await
            .map_err(QueueError::from)?;

        let stream = self.dlq_key();
        let mut deliveries = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            match Self::decode_entry(&stream, &id, &fields) {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => warn!(id, error = %e, "dropping unparseable dlq entry"),
            }
        }
        Ok(deliveries)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.manager.clone();
        let stream_length: u64 = conn.xlen(self.stream_key()).await.map_err(QueueError::from)?;
        let dlq_length: u64 = conn.xlen(self.dlq_key()).await.map_err(QueueError::from)?;

        let pending_reply: RedisResult<Value> = redis::cmd("XPENDING").arg(self.stream_key()).arg(&self.group).query_async(&mut conn).await;
        let pending = match pending_reply {
            Ok(Value::Array(parts)) => parts
                .first()
                .and_then(|v| redis::from_redis_value::<i64>(v).ok())
                .unwrap_or(0)
                .max(0) as u64,
            _ => 0,
        };

        Ok(QueueStats {
            stream_length,
            pending,
            dlq_length,
        })
    }
}
