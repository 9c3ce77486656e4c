//! Evaluation case definitions and the JSONL dataset loader (§6.3: newline-
//! delimited JSON, one case per line, missing `id` replaced with a generated
//! identifier on load).

use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EvalError, Result};

/// A single user-supplied assertion over a case's produced output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Output must contain `value` as a substring.
    Contains { value: String },
    /// Output, parsed as JSON, must validate against `schema`.
    JsonSchema { schema: serde_json::Value },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCase {
    #[serde(default)]
    id: Option<String>,
    input: String,
    #[serde(default)]
    expected_output: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    required_tools: Vec<String>,
    #[serde(default)]
    forbidden_tools: Vec<String>,
    #[serde(default)]
    assertions: Vec<Assertion>,
    #[serde(default)]
    judge_rubric: Option<String>,
    #[serde(default)]
    min_judge_score: Option<f64>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// One evaluation case (§4.4 inputs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalCase {
    pub id: String,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub forbidden_tools: Vec<String>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_rubric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_judge_score: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EvalCase {
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: None,
            tags: Vec::new(),
            required_tools: Vec::new(),
            forbidden_tools: Vec::new(),
            assertions: Vec::new(),
            judge_rubric: None,
            min_judge_score: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    pub fn with_required_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_assertions(mut self, assertions: Vec<Assertion>) -> Self {
        self.assertions = assertions;
        self
    }

    fn from_raw(raw: RawCase) -> Self {
        Self {
            id: raw.id.filter(|s| !s.is_empty()).unwrap_or_else(|| Uuid::new_v4().to_string()),
            input: raw.input,
            expected_output: raw.expected_output,
            tags: raw.tags,
            required_tools: raw.required_tools,
            forbidden_tools: raw.forbidden_tools,
            assertions: raw.assertions,
            judge_rubric: raw.judge_rubric,
            min_judge_score: raw.min_judge_score,
            metadata: raw.metadata,
        }
    }
}

/// Load cases from a newline-delimited JSON file, generating an id for any
/// line that omits one.
pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Vec<EvalCase>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut cases = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawCase = serde_json::from_str(&line).map_err(|source| EvalError::MalformedCase { line: idx + 1, source })?;
        cases.push(EvalCase::from_raw(raw));
    }

    Ok(cases)
}
