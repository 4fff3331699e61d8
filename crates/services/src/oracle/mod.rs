//! Scoring oracles grade open-ended answers.

mod llm;

use async_trait::async_trait;
use quiz_core::model::Evaluation;

use crate::error::OracleError;

pub use llm::{LlmOracle, OracleConfig};

/// Everything an oracle sees when grading one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleRequest<'a> {
    pub article_text: &'a str,
    pub question_text: &'a str,
    pub expected_answer: &'a str,
    pub student_answer: &'a str,
}

/// External grader for open-ended answers.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Grade one answer.
    ///
    /// `Ok(None)` means the oracle declined to grade; callers treat it as
    /// "no evaluation" rather than as a failure.
    ///
    /// # Errors
    ///
    /// Returns `OracleError` when the oracle could not be reached or replied
    /// with something unusable.
    async fn evaluate(
        &self,
        request: &OracleRequest<'_>,
    ) -> Result<Option<Evaluation>, OracleError>;
}
