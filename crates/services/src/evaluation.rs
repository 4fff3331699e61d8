//! Correctness decisions for open-ended answers and point totals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use quiz_core::model::{
    Article, MultipleChoiceQuestion, OpenEndedQuestion, OpenEndedResponse, QuestionNumber,
    VocabularyWord,
};
use quiz_core::scoring::{self, EmptyKeywordPolicy};

use crate::error::OracleError;
use crate::oracle::{OracleRequest, ScoringOracle};
use crate::tracker::SessionTracker;

const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Grades open-ended answers and aggregates points across question types.
#[derive(Clone)]
pub struct EvaluationService {
    oracle: Arc<dyn ScoringOracle>,
    oracle_timeout: Duration,
    empty_keyword_policy: EmptyKeywordPolicy,
}

impl EvaluationService {
    #[must_use]
    pub fn new(oracle: Arc<dyn ScoringOracle>) -> Self {
        Self {
            oracle,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            empty_keyword_policy: EmptyKeywordPolicy::default(),
        }
    }

    /// Give up on an oracle call after `timeout`.
    #[must_use]
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Verdict for keyword grading when the expected answer has no keywords.
    #[must_use]
    pub fn with_empty_keyword_policy(mut self, policy: EmptyKeywordPolicy) -> Self {
        self.empty_keyword_policy = policy;
        self
    }

    #[must_use]
    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    /// Grade an answer with the scoring oracle and record the outcome.
    ///
    /// On a grade, the response is buffered on `tracker` and its score added
    /// to the running total; the return value is `score > 0.6`. When the
    /// oracle declines, fails, or exceeds the timeout, nothing is recorded and
    /// the answer counts as incorrect.
    ///
    /// If the question was already graded in this session the new grade is
    /// reported but not recorded again.
    pub async fn evaluate_with_oracle(
        &self,
        article: &Article,
        question_text: &str,
        expected_answer: &str,
        student_answer: &str,
        question_number: QuestionNumber,
        tracker: &mut SessionTracker,
    ) -> bool {
        let request = OracleRequest {
            article_text: &article.body,
            question_text,
            expected_answer,
            student_answer,
        };

        let evaluation =
            match tokio::time::timeout(self.oracle_timeout, self.oracle.evaluate(&request)).await {
                Ok(Ok(Some(evaluation))) => evaluation,
                Ok(Ok(None)) => {
                    debug!(question_number = question_number.value(), "oracle returned no grade");
                    return false;
                }
                Ok(Err(OracleError::Disabled)) => {
                    debug!("oracle disabled; answer left ungraded");
                    return false;
                }
                Ok(Err(e)) => {
                    warn!(question_number = question_number.value(), error = %e, "oracle failed");
                    return false;
                }
                Err(_) => {
                    warn!(
                        question_number = question_number.value(),
                        timeout_secs = self.oracle_timeout.as_secs_f64(),
                        "oracle timed out"
                    );
                    return false;
                }
            };

        let score = evaluation.score();
        let response = OpenEndedResponse::from_evaluation(
            question_number,
            question_text,
            student_answer,
            evaluation,
            tracker.now(),
        );
        let is_correct = response.is_correct;

        let recorded = tracker
            .record_open_ended_response(response)
            .and_then(|()| tracker.track_open_ended(score));
        if let Err(e) = recorded {
            warn!(error = %e, "grade not recorded");
        }
        is_correct
    }

    /// Local fallback grading by keyword overlap with the expected answer.
    #[must_use]
    pub fn evaluate_by_keyword_overlap(&self, user_answer: &str, expected_answer: &str) -> bool {
        scoring::evaluate_by_keyword_overlap(
            user_answer,
            expected_answer,
            self.empty_keyword_policy,
        )
    }

    /// True when every question has an answer on record.
    #[must_use]
    pub fn all_completed(
        multiple_choice: &[MultipleChoiceQuestion],
        open_ended: &[OpenEndedQuestion],
        vocabulary: &[VocabularyWord],
        multiple_choice_answers: &HashMap<QuestionNumber, String>,
        open_ended_answers: &HashMap<QuestionNumber, String>,
        vocabulary_answers: &HashMap<String, String>,
    ) -> bool {
        scoring::all_completed(
            multiple_choice,
            open_ended,
            vocabulary,
            multiple_choice_answers,
            open_ended_answers,
            vocabulary_answers,
        )
    }

    #[must_use]
    pub fn points_earned(
        multiple_choice_correct: u32,
        open_ended_scores: &[f64],
        vocabulary_correct: u32,
    ) -> u32 {
        scoring::points_earned(multiple_choice_correct, open_ended_scores, vocabulary_correct)
    }

    #[must_use]
    pub fn points_possible(multiple_choice: u32, open_ended: u32, vocabulary: u32) -> u32 {
        scoring::points_possible(multiple_choice, open_ended, vocabulary)
    }
}

impl std::fmt::Debug for EvaluationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationService")
            .field("oracle_timeout", &self.oracle_timeout)
            .field("empty_keyword_policy", &self.empty_keyword_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use async_trait::async_trait;
    use quiz_core::model::{ArticleId, Evaluation, UserId};
    use quiz_core::time::fixed_clock;
    use storage::InMemoryDocumentStore;

    struct FixedOracle(Option<f64>);

    #[async_trait]
    impl ScoringOracle for FixedOracle {
        async fn evaluate(
            &self,
            _request: &OracleRequest<'_>,
        ) -> Result<Option<Evaluation>, OracleError> {
            Ok(self
                .0
                .map(|score| Evaluation::new(score, "feedback", "reasoning").unwrap()))
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl ScoringOracle for FailingOracle {
        async fn evaluate(
            &self,
            _request: &OracleRequest<'_>,
        ) -> Result<Option<Evaluation>, OracleError> {
            Err(OracleError::EmptyResponse)
        }
    }

    struct StalledOracle;

    #[async_trait]
    impl ScoringOracle for StalledOracle {
        async fn evaluate(
            &self,
            _request: &OracleRequest<'_>,
        ) -> Result<Option<Evaluation>, OracleError> {
            std::future::pending::<()>().await;
            Ok(None)
        }
    }

    fn tracker() -> SessionTracker {
        SessionTracker::new(
            fixed_clock(),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(StaticIdentity::signed_in(UserId::new("u1"))),
        )
    }

    fn article() -> Article {
        Article::new(ArticleId::new("a1"), "Rivers", "Rivers carve valleys over time.")
    }

    fn qn(n: u32) -> QuestionNumber {
        QuestionNumber::new(n).unwrap()
    }

    #[tokio::test]
    async fn graded_answer_is_recorded_on_tracker() {
        let service = EvaluationService::new(Arc::new(FixedOracle(Some(0.8))));
        let mut tracker = tracker();

        let correct = service
            .evaluate_with_oracle(
                &article(),
                "What carves valleys?",
                "rivers",
                "rivers do",
                qn(1),
                &mut tracker,
            )
            .await;

        assert!(correct);
        assert_eq!(tracker.state().open_ended_scores(), &[0.8]);
        let responses = tracker.state().open_ended_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].feedback, "feedback");
        assert_eq!(responses[0].reasoning, "reasoning");
        assert!(responses[0].is_correct);
    }

    #[tokio::test]
    async fn score_at_threshold_is_incorrect_but_still_recorded() {
        let service = EvaluationService::new(Arc::new(FixedOracle(Some(0.6))));
        let mut tracker = tracker();

        let correct = service
            .evaluate_with_oracle(&article(), "q", "e", "s", qn(1), &mut tracker)
            .await;

        assert!(!correct);
        assert_eq!(tracker.state().open_ended_scores(), &[0.6]);
    }

    #[tokio::test]
    async fn missing_grade_is_incorrect_and_untracked() {
        let service = EvaluationService::new(Arc::new(FixedOracle(None)));
        let mut tracker = tracker();

        let correct = service
            .evaluate_with_oracle(&article(), "q", "e", "s", qn(1), &mut tracker)
            .await;

        assert!(!correct);
        assert!(tracker.state().open_ended_scores().is_empty());
        assert!(tracker.state().open_ended_responses().is_empty());
    }

    #[tokio::test]
    async fn oracle_error_is_treated_as_no_grade() {
        let service = EvaluationService::new(Arc::new(FailingOracle));
        let mut tracker = tracker();

        assert!(
            !service
                .evaluate_with_oracle(&article(), "q", "e", "s", qn(1), &mut tracker)
                .await
        );
        assert!(tracker.state().open_ended_scores().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_oracle_times_out() {
        let service = EvaluationService::new(Arc::new(StalledOracle))
            .with_oracle_timeout(Duration::from_secs(5));
        let mut tracker = tracker();

        let correct = service
            .evaluate_with_oracle(&article(), "q", "e", "s", qn(1), &mut tracker)
            .await;

        assert!(!correct);
        assert!(tracker.state().open_ended_scores().is_empty());
    }

    #[tokio::test]
    async fn regrading_a_question_does_not_double_count() {
        let service = EvaluationService::new(Arc::new(FixedOracle(Some(0.9))));
        let mut tracker = tracker();

        for _ in 0..2 {
            service
                .evaluate_with_oracle(&article(), "q", "e", "s", qn(1), &mut tracker)
                .await;
        }

        assert_eq!(tracker.state().open_ended_scores().len(), 1);
        assert_eq!(tracker.state().open_ended_responses().len(), 1);
    }

    #[test]
    fn keyword_policy_is_configurable() {
        let strict = EvaluationService::new(Arc::new(FixedOracle(None)));
        let lenient = strict
            .clone()
            .with_empty_keyword_policy(EmptyKeywordPolicy::Accept);

        assert!(!strict.evaluate_by_keyword_overlap("the cat sat on mat", "The Cat Sat"));
        assert!(lenient.evaluate_by_keyword_overlap("the cat sat on mat", "The Cat Sat"));
    }

    #[test]
    fn point_helpers_match_worked_examples() {
        assert_eq!(EvaluationService::points_earned(3, &[0.5, 0.9], 2), 42);
        assert_eq!(EvaluationService::points_possible(5, 3, 10), 90);
    }
}
