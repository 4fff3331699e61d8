use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::model::QuestionNumber;

/// Score an open-ended answer must exceed to count as correct.
pub const OPEN_ENDED_PASS_THRESHOLD: f64 = 0.6;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResponseError {
    #[error("score must be a finite number, got {0}")]
    InvalidScore(f64),
}

/// Clamps a grade into `[0, 1]`.
///
/// # Errors
///
/// Returns `ResponseError::InvalidScore` for `NaN` or infinite scores.
pub fn checked_score(score: f64) -> Result<f64, ResponseError> {
    if score.is_finite() {
        Ok(score.clamp(0.0, 1.0))
    } else {
        Err(ResponseError::InvalidScore(score))
    }
}

fn serialize_finite<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if score.is_finite() {
        serializer.serialize_f64(*score)
    } else {
        Err(serde::ser::Error::custom(ResponseError::InvalidScore(*score)))
    }
}

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

/// Grade returned by the scoring oracle for one open-ended answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvaluation")]
pub struct Evaluation {
    score: f64,
    feedback: String,
    reasoning: String,
}

impl Evaluation {
    /// Builds an evaluation, clamping the score into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `ResponseError::InvalidScore` for `NaN` or infinite scores.
    pub fn new(
        score: f64,
        feedback: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Result<Self, ResponseError> {
        Ok(Self {
            score: checked_score(score)?,
            feedback: feedback.into(),
            reasoning: reasoning.into(),
        })
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.score > OPEN_ENDED_PASS_THRESHOLD
    }
}

#[derive(Deserialize)]
struct RawEvaluation {
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    reasoning: String,
}

impl TryFrom<RawEvaluation> for Evaluation {
    type Error = ResponseError;

    fn try_from(raw: RawEvaluation) -> Result<Self, Self::Error> {
        Evaluation::new(raw.score, raw.feedback, raw.reasoning)
    }
}

//
// ─── RESPONSES ─────────────────────────────────────────────────────────────────
//

/// A single answered multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoiceResponse {
    pub question_number: QuestionNumber,
    pub question_text: String,
    pub student_choice: String,
    pub correct_choice: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// A single graded open-ended answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenEndedResponse {
    pub question_number: QuestionNumber,
    pub question_text: String,
    pub student_answer: String,
    pub feedback: String,
    pub reasoning: String,
    #[serde(serialize_with = "serialize_finite")]
    pub score: f64,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl OpenEndedResponse {
    /// Folds an oracle evaluation into a persisted response.
    #[must_use]
    pub fn from_evaluation(
        question_number: QuestionNumber,
        question_text: impl Into<String>,
        student_answer: impl Into<String>,
        evaluation: Evaluation,
        answered_at: DateTime<Utc>,
    ) -> Self {
        let is_correct = evaluation.is_passing();
        Self {
            question_number,
            question_text: question_text.into(),
            student_answer: student_answer.into(),
            score: evaluation.score,
            feedback: evaluation.feedback,
            reasoning: evaluation.reasoning,
            is_correct,
            answered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn evaluation_clamps_out_of_range_scores() {
        assert_eq!(Evaluation::new(1.7, "", "").unwrap().score(), 1.0);
        assert_eq!(Evaluation::new(-0.2, "", "").unwrap().score(), 0.0);
    }

    #[test]
    fn evaluation_rejects_nan() {
        let err = Evaluation::new(f64::NAN, "", "").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidScore(_)));
    }

    #[test]
    fn deserialized_evaluation_is_clamped() {
        let eval: Evaluation =
            serde_json::from_str(r#"{"score": 1.5, "feedback": "ok", "reasoning": ""}"#).unwrap();
        assert_eq!(eval.score(), 1.0);
        assert_eq!(eval.feedback(), "ok");
    }

    #[test]
    fn non_finite_response_score_does_not_serialize() {
        let mut response = OpenEndedResponse::from_evaluation(
            QuestionNumber::new(1).unwrap(),
            "Why?",
            "Because",
            Evaluation::new(0.5, "", "").unwrap(),
            fixed_now(),
        );
        assert!(serde_json::to_value(&response).is_ok());

        response.score = f64::NAN;
        assert!(serde_json::to_value(&response).is_err());
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        assert!(!Evaluation::new(0.6, "", "").unwrap().is_passing());
        assert!(Evaluation::new(0.61, "", "").unwrap().is_passing());
    }

    #[test]
    fn open_ended_response_carries_oracle_text() {
        let eval = Evaluation::new(0.8, "Nice summary", "Mentions both causes").unwrap();
        let number = QuestionNumber::new(2).unwrap();
        let response =
            OpenEndedResponse::from_evaluation(number, "Why?", "Because", eval, fixed_now());

        assert!(response.is_correct);
        assert_eq!(response.feedback, "Nice summary");
        assert_eq!(response.reasoning, "Mentions both causes");
        assert_eq!(response.question_number, number);
    }
}
