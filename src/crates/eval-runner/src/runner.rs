//! The bounded-concurrency evaluation loop (§4.4 Algorithm).

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use runtime_types::{Runner, RunnerError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::case::{Assertion, EvalCase};
use crate::judge::Judge;
use crate::options::{EvalOptions, ResolvedOptions};
use crate::report::{build_report, CaseResult, CheckResult, Report};

/// Drives a dataset of [`EvalCase`]s against a [`Runner`] with bounded
/// concurrency, retries, timeouts, and assertion checks, producing a
/// [`Report`].
pub struct EvalRunner {
    runner: Arc<dyn Runner>,
    judge: Option<Arc<dyn Judge>>,
    options: EvalOptions,
}

impl EvalRunner {
    pub fn new(runner: Arc<dyn Runner>, options: EvalOptions) -> Self {
        Self { runner, judge: None, options }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub async fn run(&self, cases: Vec<EvalCase>) -> Report {
        let cases = match self.options.max_cases {
            Some(max) => cases.into_iter().take(max).collect::<Vec<_>>(),
            None => cases,
        };
        let case_count = cases.len();
        let resolved = self.options.resolve(case_count);
        let case_ids: Vec<String> = cases.iter().map(|c| c.id.clone()).collect();

        debug!(cases = case_count, workers = resolved.workers, "starting evaluation run");

        let results: Arc<Mutex<Vec<Option<CaseResult>>>> = Arc::new(Mutex::new(vec![None; case_count]));

        let dispatch = {
            let results = results.clone();
            let runner = self.runner.clone();
            let judge = self.judge.clone();
            let resolved = resolved.clone();

            stream::iter(cases.into_iter().enumerate()).for_each_concurrent(resolved.workers, move |(idx, case)| {
                let results = results.clone();
                let runner = runner.clone();
                let judge = judge.clone();
                let resolved = resolved.clone();
                async move {
                    let result = run_case_with_retries(runner.as_ref(), judge.as_deref(), &case, &resolved).await;
                    results.lock().await[idx] = Some(result);
                }
            })
        };

        let timed_out = match resolved.timeout {
            Some(timeout) => tokio::time::timeout(timeout, dispatch).await.is_err(),
            None => {
                dispatch.await;
                false
            }
        };

        let mut results = results.lock().await;
        let mut finished = Vec::with_capacity(case_count);
        for (idx, slot) in results.iter_mut().enumerate() {
            let result = slot.take().unwrap_or_else(|| {
                if !timed_out {
                    warn!(index = idx, "case missing a result with no timeout in effect");
                }
                synthesize_context_failure(&case_ids[idx], "evaluation timed out before this case was dispatched")
            });
            finished.push(result);
        }

        build_report(finished)
    }
}

async fn run_case_with_retries(runner: &dyn Runner, judge: Option<&dyn Judge>, case: &EvalCase, opts: &ResolvedOptions) -> CaseResult {
    let mut attempts = 0u32;
    let mut last = None;

    loop {
        attempts += 1;
        let attempt = run_case_attempt(runner, judge, case, opts).await;
        let runner_succeeded = attempt.error.is_empty();
        last = Some(attempt);

        if runner_succeeded || attempts > opts.retries {
            break;
        }

        tokio::time::sleep(opts.backoff_delay(attempts)).await;
    }

    let mut result = last.expect("at least one attempt always runs");
    result.attempts = attempts;
    result
}

async fn run_case_attempt(runner: &dyn Runner, judge: Option<&dyn Judge>, case: &EvalCase, opts: &ResolvedOptions) -> CaseResult {
    let started = Instant::now();

    let run_outcome = match opts.case_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, runner.run(&case.input)).await {
            Ok(inner) => inner,
            Err(_) => Err(format!("case timed out after {}ms", timeout.as_millis()).into()),
        },
        None => runner.run(&case.input).await,
    };

    match run_outcome {
        Ok(run_result) => {
            let latency_ms = run_result
                .reported_latency()
                .and_then(|d| u64::try_from(d.num_milliseconds()).ok())
                .unwrap_or_else(|| started.elapsed().as_millis() as u64);
            let used_tools = run_result.used_tools();

            let mut checks = Vec::new();
            let mut had_tool_constraint = false;

            if let Some(expected) = &case.expected_output {
                checks.push(check_contains("expected_output", &run_result.output, expected));
            }

            for tool in &case.required_tools {
                had_tool_constraint = true;
                checks.push(check_required_tool(tool, &used_tools));
            }

            for tool in &case.forbidden_tools {
                had_tool_constraint = true;
                checks.push(check_forbidden_tool(tool, &used_tools));
            }

            for assertion in &case.assertions {
                checks.push(check_assertion(assertion, &run_result.output));
            }

            if let (Some(judge), Some(rubric)) = (judge, &case.judge_rubric) {
                let min_score = case.min_judge_score.unwrap_or(opts.min_judge_score);
                match judge.score(rubric, &case.input, &run_result.output).await {
                    Ok(score) => checks.push(judge_check(score, min_score)),
                    Err(e) => checks.push(CheckResult::fail("judge_score", e.to_string())),
                }
            }

            let pass = checks.iter().all(|c| c.pass);

            CaseResult {
                case_id: case.id.clone(),
                pass,
                output: run_result.output,
                error: String::new(),
                checks,
                used_tools,
                usage: run_result.usage,
                latency_ms: Some(latency_ms),
                attempts: 0,
                tags: case.tags.clone(),
                had_tool_constraint,
            }
        }
        Err(err) => runner_error_result(case, err),
    }
}

fn runner_error_result(case: &EvalCase, err: RunnerError) -> CaseResult {
    CaseResult {
        case_id: case.id.clone(),
        pass: false,
        output: String::new(),
        error: err.to_string(),
        checks: vec![CheckResult::fail("run", err.to_string())],
        used_tools: Vec::new(),
        usage: None,
        latency_ms: None,
        attempts: 0,
        tags: case.tags.clone(),
        had_tool_constraint: !case.required_tools.is_empty() || !case.forbidden_tools.is_empty(),
    }
}

fn synthesize_context_failure(case_id: &str, message: &str) -> CaseResult {
    CaseResult {
        case_id: case_id.to_string(),
        pass: false,
        output: String::new(),
        error: message.to_string(),
        checks: vec![CheckResult::fail("run", message)],
        used_tools: Vec::new(),
        usage: None,
        latency_ms: None,
        attempts: 0,
        tags: Vec::new(),
        had_tool_constraint: false,
    }
}

fn check_contains(name: &str, output: &str, expected: &str) -> CheckResult {
    if output.contains(expected) {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(name, format!("output does not contain {expected:?}"))
    }
}

fn check_required_tool(tool: &str, used_tools: &[String]) -> CheckResult {
    let name = format!("required_tool:{tool}");
    let found = used_tools.iter().any(|t| t.trim().eq_ignore_ascii_case(tool.trim()));
    if found {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(name, format!("tool {tool} was not used"))
    }
}

fn check_forbidden_tool(tool: &str, used_tools: &[String]) -> CheckResult {
    let name = format!("forbidden_tool:{tool}");
    let found = used_tools.iter().any(|t| t.trim().eq_ignore_ascii_case(tool.trim()));
    if found {
        CheckResult::fail(name, format!("forbidden tool {tool} was used"))
    } else {
        CheckResult::pass(name)
    }
}

fn check_assertion(assertion: &Assertion, output: &str) -> CheckResult {
    match assertion {
        Assertion::Contains { value } => check_contains("contains", output, value),
        Assertion::JsonSchema { schema } => match serde_json::from_str::<serde_json::Value>(output) {
            Ok(instance) => match jsonschema::JSONSchema::compile(schema) {
                Ok(compiled) => {
                    if compiled.is_valid(&instance) {
                        CheckResult::pass("json_schema")
                    } else {
                        CheckResult::fail("json_schema", "output does not conform to schema")
                    }
                }
                Err(e) => CheckResult::fail("json_schema", format!("invalid schema: {e}")),
            },
            Err(e) => CheckResult::fail("json_schema", format!("output is not valid JSON: {e}")),
        },
    }
}

fn judge_check(score: f64, min_score: f64) -> CheckResult {
    if score >= min_score {
        CheckResult::pass("judge_score")
    } else {
        CheckResult::fail("judge_score", format!("score {score} below minimum {min_score}"))
    }
}
