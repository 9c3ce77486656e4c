//! A `sqlx`-backed durable store implementing the §4.2 relational schema
//! sketch over SQLite. Rows are mapped manually (not via `FromRow` derive)
//! since the `Run`/`Checkpoint` wire types carry JSON-valued fields that
//! don't map onto SQL columns one-to-one, requiring a bespoke row model.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runtime_types::{Checkpoint, Message, Run, RunStatus, Usage};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::{Result, StoreError};
use crate::traits::{DurableBackend, RunFilter, StoreStats};

/// A durable store backed by a SQLite database (file-based or `:memory:`).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StoreError::Fatal(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<Run> {
        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "queued" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "canceled" => RunStatus::Canceled,
            other => return Err(StoreError::Fatal(format!("unknown run status {other}"))),
        };
        let messages_json: String = row.try_get("messages")?;
        let messages: Vec<Message> = serde_json::from_str(&messages_json)?;
        let usage_json: Option<String> = row.try_get("usage")?;
        let usage: Option<Usage> = usage_json.map(|s| serde_json::from_str(&s)).transpose()?;
        let metadata_json: String = row.try_get("metadata")?;
        let metadata = serde_json::from_str(&metadata_json)?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;

        Ok(Run {
            run_id: row.try_get("run_id")?,
            session_id: row.try_get("session_id")?,
            provider: row.try_get("provider")?,
            status,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            messages,
            usage,
            metadata,
            error: row.try_get("error")?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
        })
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
        let state_json: String = row.try_get("state")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Checkpoint {
            run_id: row.try_get("run_id")?,
            seq: row.try_get::<i64, _>("seq")? as u64,
            node_id: row.try_get("node_id")?,
            state: serde_json::from_str(&state_json)?,
            created_at: parse_ts(&created_at)?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Fatal(format!("invalid timestamp {s}: {e}")))
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Canceled => "canceled",
    }
}

#[async_trait]
impl DurableBackend for SqliteStore {
    async fn save_run(&self, run: Run) -> Result<()> {
        let run = match self.load_run(&run.run_id).await {
            Ok(mut existing) => {
                existing.merge_upsert(run.clone(), run.updated_at);
                existing
            }
            Err(e) if e.is_not_found() => run,
            Err(e) => return Err(e),
        };

        let messages = serde_json::to_string(&run.messages)?;
        let usage = run.usage.map(|u| serde_json::to_string(&u)).transpose()?;
        let metadata = serde_json::to_string(&run.metadata)?;

        sqlx::query(
            "INSERT INTO runs (run_id, session_id, provider, status, input, output, messages, usage, metadata, error, created_at, updated_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET
                session_id = excluded.session_id,
                provider = excluded.provider,
                status = excluded.status,
                input = excluded.input,
                output = excluded.output,
                messages = excluded.messages,
                usage = excluded.usage,
                metadata = excluded.metadata,
                error = excluded.error,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at",
        )
        .bind(&run.run_id)
        .bind(&run.session_id)
        .bind(&run.provider)
        .bind(status_str(run.status))
        .bind(&run.input)
        .bind(&run.output)
        .bind(&messages)
        .bind(&usage)
        .bind(&metadata)
        .bind(&run.error)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Run> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("run {run_id}")))?;
        Self::row_to_run(&row)
    }

    async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let mut sql = String::from("SELECT * FROM runs WHERE 1=1");
        if filter.session_id.is_some() {
            sql.push_str(" AND session_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(session_id) = &filter.session_id {
            query = query.bind(session_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status_str(status));
        }
        query = query.bind(filter.limit.max(1) as i64).bind(filter.offset as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_run).collect()
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let result = sqlx::query(
            "INSERT INTO checkpoints (run_id, seq, node_id, state, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.run_id)
        .bind(checkpoint.seq as i64)
        .bind(&checkpoint.node_id)
        .bind(&state)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(StoreError::conflict(format!(
                "checkpoint ({}, {}) already exists",
                checkpoint.run_id, checkpoint.seq
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_latest_checkpoint(&self, run_id: &str) -> Result<Checkpoint> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE run_id = ? ORDER BY seq DESC LIMIT 1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("checkpoint for run {run_id}")))?;
        Self::row_to_checkpoint(&row)
    }

    async fn list_checkpoints(&self, run_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE run_id = ? ORDER BY seq DESC LIMIT ?")
            .bind(run_id)
            .bind(limit.max(1) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_checkpoint).collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM runs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = StoreStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            stats.total_runs += n as u64;
            match status.as_str() {
                "queued" => stats.queued = n as u64,
                "running" => stats.running = n as u64,
                "completed" => stats.completed = n as u64,
                "failed" => stats.failed = n as u64,
                "canceled" => stats.canceled = n as u64,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn acquire_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));

        let existing: Option<String> = sqlx::query("SELECT expires_at FROM run_locks WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.try_get::<String, _>("expires_at"))
            .transpose()?;

        if let Some(expires_at_str) = existing {
            let existing_expiry = parse_ts(&expires_at_str)?;
            if existing_expiry > now {
                return Ok(false);
            }
        }

        sqlx::query(
            "INSERT INTO run_locks (run_id, owner, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
        )
        .bind(run_id)
        .bind(owner)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    async fn release_run_lock(&self, run_id: &str, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM run_locks WHERE run_id = ? AND owner = ?")
            .bind(run_id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn renew_run_lock(&self, run_id: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));

        let result = sqlx::query(
            "UPDATE run_locks SET expires_at = ? WHERE run_id = ? AND owner = ? AND expires_at > ?",
        )
        .bind(expires_at.to_rfc3339())
        .bind(run_id)
        .bind(owner)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = store().await;
        let run = Run::new("r1", "s1", "hi", Utc::now());
        store.save_run(run.clone()).await.unwrap();
        let loaded = store.load_run("r1").await.unwrap();
        assert_eq!(loaded.run_id, "r1");
        assert_eq!(loaded.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let store = store().await;
        let t0 = Utc::now();
        let mut run = Run::new("r1", "s1", "hi", t0);
        store.save_run(run.clone()).await.unwrap();

        run.status = RunStatus::Running;
        run.updated_at = t0 + chrono::Duration::seconds(5);
        store.save_run(run).await.unwrap();

        let loaded = store.load_run("r1").await.unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.created_at.timestamp(), t0.timestamp());
    }

    #[tokio::test]
    async fn duplicate_checkpoint_seq_conflicts() {
        let store = store().await;
        store.save_run(Run::new("r1", "s1", "hi", Utc::now())).await.unwrap();
        let cp = Checkpoint::new("r1", 1, "n1", serde_json::json!({}), Utc::now());
        store.save_checkpoint(cp.clone()).await.unwrap();
        let err = store.save_checkpoint(cp).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn list_runs_filters_by_status() {
        let store = store().await;
        let mut r1 = Run::new("r1", "s1", "hi", Utc::now());
        r1.status = RunStatus::Completed;
        store.save_run(r1).await.unwrap();
        store.save_run(Run::new("r2", "s1", "hi", Utc::now())).await.unwrap();

        let filter = RunFilter::new().with_status(RunStatus::Completed);
        let runs = store.list_runs(&filter).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "r1");
    }

    #[tokio::test]
    async fn lock_compare_and_delete_semantics() {
        let store = store().await;
        assert!(store.acquire_run_lock("r1", "A", Duration::from_secs(10)).await.unwrap());
        assert!(!store.acquire_run_lock("r1", "B", Duration::from_secs(10)).await.unwrap());
        store.release_run_lock("r1", "B").await.unwrap();
        assert!(!store.acquire_run_lock("r1", "C", Duration::from_secs(10)).await.unwrap());
        store.release_run_lock("r1", "A").await.unwrap();
        assert!(store.acquire_run_lock("r1", "D", Duration::from_secs(10)).await.unwrap());
    }
}
