//! The `Run` record and its terminal/non-terminal status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a run. Transitions are one-way once a terminal status is
/// reached: `Completed`, `Failed`, and `Canceled` never transition back to
/// `Queued` or `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl RunStatus {
    /// True for statuses a run cannot leave once entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

/// One role-tagged message in a run's transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Token accounting for a run or a single evaluation attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A single execution of an agent or graph configuration for one input.
///
/// Identity is `run_id`; `session_id` groups related runs (e.g. a
/// multi-turn conversation). Field names are kept stable so the JSON
/// wire/storage format doesn't drift across backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Construct a freshly-queued run. `created_at`/`updated_at` are set to
    /// `now` and must be preserved by the store across subsequent saves.
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            provider: None,
            status: RunStatus::Queued,
            input: input.into(),
            output: String::new(),
            messages: Vec::new(),
            usage: None,
            metadata: HashMap::new(),
            error: String::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply an upsert of `other` onto `self`, preserving `created_at` and
    /// rejecting any attempt to move a terminal run back to a non-terminal
    /// status. `other.updated_at` is used if newer, otherwise `now` is
    /// used, since `updated_at` must be monotonically non-decreasing.
    pub fn merge_upsert(&mut self, mut other: Run, now: DateTime<Utc>) {
        if self.status.is_terminal() && !other.status.is_terminal() {
            other.status = self.status;
        }
        other.created_at = self.created_at;
        other.updated_at = other.updated_at.max(self.updated_at).max(now);
        *self = other;
    }
}
