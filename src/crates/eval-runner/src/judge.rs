//! Optional LLM-judge scoring contract. Like `Runner`, the judge itself is
//! an external collaborator — the core only knows it produces a score.

use async_trait::async_trait;

pub type JudgeError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Judge: Send + Sync {
    /// Score `output` against `rubric` for the given `input`. Expected range
    /// is `[0.0, 1.0]`; callers compare against a case's `minJudgeScore`.
    async fn score(&self, rubric: &str, input: &str, output: &str) -> Result<f64, JudgeError>;
}
