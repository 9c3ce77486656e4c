//! Queued work, its claimed form, and the attempt breadcrumbs workers leave.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queued unit of work: one pending attempt at a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub run_id: String,
    pub session_id: String,
    #[serde(default)]
    pub input: String,
    /// 1-based.
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

impl Task {
    pub fn first_attempt(run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            input: input.into(),
            attempt: 1,
            max_attempts,
            mode: None,
            workflow: None,
        }
    }

    /// A copy of this task for the next attempt, as requeued on failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// A claimed task plus the queue metadata needed to ack, nack, or requeue
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub message_id: String,
    pub stream: String,
    pub task: Task,
    pub received_at: DateTime<Utc>,
}

/// The lifecycle status of one attempt at executing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Started,
    Completed,
    Failed,
    Canceled,
}

/// `(run_id, attempt)` identifies one execution try. Persisted independently
/// of the run so a crashed worker still leaves an observable breadcrumb.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub run_id: String,
    pub attempt: u32,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn started(run_id: impl Into<String>, attempt: u32, worker_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            attempt,
            worker_id: worker_id.into(),
            started_at: now,
            ended_at: None,
            status: AttemptStatus::Started,
            error: None,
        }
    }
}
