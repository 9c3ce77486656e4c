//! The `Runner` contract (§6.1): the single operation the graph executor's
//! Agent node and the evaluation runner both invoke. Implementations — LLM
//! adapters, static test doubles, even another graph executor — are external
//! to the core; this crate only defines the seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::run::{Message, Usage};

/// Boxed so a `Runner` implementation can surface whatever error type it
/// likes (an HTTP client error, a timeout, a provider-specific failure)
/// without the core needing to know its shape.
pub type RunnerError = Box<dyn std::error::Error + Send + Sync>;

/// What a `Runner` call produces on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub output: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl RunResult {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// Wall-clock latency if both timestamps were supplied by the runner;
    /// the caller falls back to its own wall-clock measurement otherwise.
    pub fn reported_latency(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }

    /// Tool names used during this call, per the evaluation runner's
    /// extraction rule: prefer `before_tool` events' attached tool name,
    /// falling back to any `role = "tool"` message's `name`.
    pub fn used_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self
            .events
            .iter()
            .filter(|e| e.kind == crate::event::EventKind::Tool && e.status == crate::event::EventStatus::Started)
            .filter_map(|e| e.attributes.get("tool_name").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        if tools.is_empty() {
            tools = self
                .messages
                .iter()
                .filter(|m| m.role == "tool")
                .filter_map(|m| m.name.clone())
                .collect();
        }
        tools
    }
}

/// A single opaque operation: input string in, `RunResult` or error out.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, input: &str) -> Result<RunResult, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventStatus};

    #[test]
    fn used_tools_prefers_before_tool_events() {
        let mut result = RunResult::new("done");
        let mut event = Event::new(EventKind::Tool, EventStatus::Started, "before_tool");
        event.attributes.insert("tool_name".to_string(), serde_json::json!("shell"));
        result.events.push(event);
        result.messages.push(Message {
            role: "tool".to_string(),
            content: "ignored".to_string(),
            name: Some("other_tool".to_string()),
        });

        assert_eq!(result.used_tools(), vec!["shell".to_string()]);
    }

    #[test]
    fn used_tools_falls_back_to_tool_messages() {
        let mut result = RunResult::new("done");
        result.messages.push(Message {
            role: "tool".to_string(),
            content: "ran".to_string(),
            name: Some("shell".to_string()),
        });
        assert_eq!(result.used_tools(), vec!["shell".to_string()]);
    }

    #[test]
    fn reported_latency_requires_both_timestamps() {
        let mut result = RunResult::new("done");
        assert!(result.reported_latency().is_none());
        let now = Utc::now();
        result.started_at = Some(now);
        result.completed_at = Some(now + chrono::Duration::milliseconds(50));
        assert_eq!(result.reported_latency(), Some(chrono::Duration::milliseconds(50)));
    }
}
