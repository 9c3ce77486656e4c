//! A `sqlx`-backed persistent `EventStore` over SQLite, following the same
//! manual row-mapping shape `state_store::sqlite::SqliteStore` uses for its
//! own JSON-bearing columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runtime_types::{Event, EventKind, EventSink, EventStatus};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::{ObservabilityError, Result};
use crate::store::{accumulate, Aggregation, EventStore};

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| ObservabilityError::Fatal(e.to_string()))?;
        Ok(Self { pool })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
        let kind_str: String = row.try_get("kind")?;
        let status_str: String = row.try_get("status")?;
        let attributes_json: String = row.try_get("attributes")?;
        let timestamp: String = row.try_get("timestamp")?;
        Ok(Event {
            id: row.try_get("id")?,
            kind: parse_kind(&kind_str)?,
            status: parse_status(&status_str)?,
            run_id: row.try_get("run_id")?,
            session_id: row.try_get("session_id")?,
            span_id: row.try_get("span_id")?,
            parent_span_id: row.try_get("parent_span_id")?,
            name: row.try_get("name")?,
            duration_ms: row.try_get::<Option<i64>, _>("duration_ms")?.map(|d| d as u64),
            attributes: serde_json::from_str(&attributes_json)?,
            timestamp: parse_ts(&timestamp)?,
        })
    }
}

fn kind_str(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Run => "run",
        EventKind::Provider => "provider",
        EventKind::Tool => "tool",
        EventKind::Graph => "graph",
        EventKind::Checkpoint => "checkpoint",
        EventKind::Custom => "custom",
    }
}

fn parse_kind(s: &str) -> Result<EventKind> {
    Ok(match s {
        "run" => EventKind::Run,
        "provider" => EventKind::Provider,
        "tool" => EventKind::Tool,
        "graph" => EventKind::Graph,
        "checkpoint" => EventKind::Checkpoint,
        "custom" => EventKind::Custom,
        other => return Err(ObservabilityError::Fatal(format!("unknown event kind {other}"))),
    })
}

fn status_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Started => "started",
        EventStatus::Completed => "completed",
        EventStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<EventStatus> {
    Ok(match s {
        "started" => EventStatus::Started,
        "completed" => EventStatus::Completed,
        "failed" => EventStatus::Failed,
        other => return Err(ObservabilityError::Fatal(format!("unknown event status {other}"))),
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ObservabilityError::Fatal(format!("invalid timestamp {s}: {e}")))
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: Event) -> Result<()> {
        let attributes = serde_json::to_string(&event.attributes)?;
        sqlx::query(
            "INSERT INTO events (id, kind, status, run_id, session_id, span_id, parent_span_id, name, duration_ms, attributes, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(kind_str(event.kind))
        .bind(status_str(event.status))
        .bind(&event.run_id)
        .bind(&event.session_id)
        .bind(&event.span_id)
        .bind(&event.parent_span_id)
        .bind(&event.name)
        .bind(event.duration_ms.map(|d| d as i64))
        .bind(&attributes)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_run(&self, run_id: &str, limit: usize) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM events WHERE run_id = ? ORDER BY timestamp DESC LIMIT ?")
            .bind(run_id)
            .bind(limit.max(1) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn list_by_session(&self, session_id: &str, limit: usize) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM events WHERE session_id = ? ORDER BY timestamp DESC LIMIT ?")
            .bind(session_id)
            .bind(limit.max(1) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn aggregate(&self, since: Option<DateTime<Utc>>) -> Result<Aggregation> {
        let rows = if let Some(since) = since {
            sqlx::query("SELECT kind, status FROM events WHERE timestamp >= ?")
                .bind(since.to_rfc3339())
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT kind, status FROM events").fetch_all(&self.pool).await?
        };

        let mut agg = Aggregation::default();
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let status: String = row.try_get("status")?;
            accumulate(&mut agg, parse_kind(&kind)?, parse_status(&status)?);
        }
        Ok(agg)
    }
}

/// Lets a `SqliteEventStore` serve directly as an `AsyncSink`'s downstream.
#[async_trait]
impl EventSink for SqliteEventStore {
    async fn emit(&self, event: Event) {
        if let Err(e) = EventStore::append(self, event).await {
            warn!(error = %e, "failed to persist event");
        }
    }
}
