//! Observability events: enough data per event to reconstruct a span
//! without referring to any other event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Run,
    Provider,
    Tool,
    Graph,
    Checkpoint,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub kind: EventKind,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, status: EventStatus, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind,
            status,
            run_id: None,
            session_id: None,
            span_id: None,
            parent_span_id: None,
            name: name.into(),
            duration_ms: None,
            attributes: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Normalize before persisting: default a zero timestamp to now, assign
    /// an id if blank, and ensure `attributes` is a non-nil mapping (it
    /// already is in Rust — this guards values that round-tripped through
    /// JSON with a `null` attributes field).
    pub fn normalize(mut self, now: DateTime<Utc>) -> Self {
        if self.timestamp.timestamp() == 0 {
            self.timestamp = now;
        }
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self
    }
}
