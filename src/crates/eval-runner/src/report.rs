//! Per-case results and the aggregate report (§4.4 "Report aggregates").

use std::collections::HashMap;

use serde::Serialize;

/// Outcome of one named check against a case's output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pass: true,
            message: String::new(),
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pass: false,
            message: message.into(),
        }
    }
}

/// The outcome of running one case, including every attempt's final state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub case_id: String,
    pub pass: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub checks: Vec<CheckResult>,
    pub used_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<runtime_types::Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub attempts: u32,
    pub tags: Vec<String>,
    pub had_tool_constraint: bool,
}

/// Latency percentile/average aggregates over `latencyMs`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub average_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

/// The full evaluation report (§4.4 "Report aggregates").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub latency: LatencyStats,
    pub total_tokens: u64,
    pub tag_tallies: HashMap<String, TagTally>,
    pub tool_constraint_cases: usize,
    pub tool_constraint_passed: usize,
    pub results: Vec<CaseResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TagTally {
    pub total: usize,
    pub passed: usize,
}

/// `p=0 → min`, `p=100 → max`, empty set → 0, single value → that value.
/// `index = floor((p/100) * (n-1))`.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub(crate) fn build_report(results: Vec<CaseResult>) -> Report {
    let total = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let failed = total - passed;
    let pass_rate = if total == 0 { 0.0 } else { (passed as f64 / total as f64) * 100.0 };

    let mut latencies: Vec<u64> = results.iter().filter_map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    let average_ms = if latencies.is_empty() { 0.0 } else { latencies.iter().sum::<u64>() as f64 / latencies.len() as f64 };
    let latency = LatencyStats {
        average_ms,
        p50_ms: percentile(&latencies, 50.0),
        p95_ms: percentile(&latencies, 95.0),
    };

    let total_tokens = results.iter().filter_map(|r| r.usage.as_ref()).map(|u| u.total_tokens).sum();

    let mut tag_tallies: HashMap<String, TagTally> = HashMap::new();
    for result in &results {
        for tag in &result.tags {
            let tally = tag_tallies.entry(tag.clone()).or_default();
            tally.total += 1;
            if result.pass {
                tally.passed += 1;
            }
        }
    }

    let tool_constraint_cases = results.iter().filter(|r| r.had_tool_constraint).count();
    let tool_constraint_passed = results
        .iter()
        .filter(|r| r.had_tool_constraint)
        .filter(|r| r.checks.iter().filter(|c| c.name.starts_with("required_tool:") || c.name.starts_with("forbidden_tool:")).all(|c| c.pass))
        .count();

    Report {
        total,
        passed,
        failed,
        pass_rate,
        latency,
        total_tokens,
        tag_tallies,
        tool_constraint_cases,
        tool_constraint_passed,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0);
    }

    #[test]
    fn percentile_single_value() {
        assert_eq!(percentile(&[42], 0.0), 42);
        assert_eq!(percentile(&[42], 100.0), 42);
    }

    #[test]
    fn percentile_min_and_max() {
        let values = vec![1, 2, 3, 4, 5];
        assert_eq!(percentile(&values, 0.0), 1);
        assert_eq!(percentile(&values, 100.0), 5);
    }
}
