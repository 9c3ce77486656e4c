//! Bounded-concurrency evaluation harness (§4.4): runs a dataset of cases
//! against an opaque `Runner`, applying timeouts, retries, and assertion
//! checks, and aggregates the results into a [`Report`].

pub mod case;
pub mod error;
pub mod judge;
pub mod options;
pub mod report;
pub mod runner;

pub use case::{load_jsonl, Assertion, EvalCase};
pub use error::{EvalError, Result};
pub use judge::{Judge, JudgeError};
pub use options::EvalOptions;
pub use report::{percentile, CaseResult, CheckResult, LatencyStats, Report, TagTally};
pub use runner::EvalRunner;
