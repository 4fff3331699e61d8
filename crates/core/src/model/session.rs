use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ArticleId, SessionId, UserId};
use crate::scoring;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionRecordError {
    #[error("accuracy {stored} does not match earned/possible ({expected})")]
    AccuracyMismatch { stored: f64, expected: f64 },

    #[error("completed_at is before created_at")]
    InvalidTimeRange,

    #[error("open-ended correct count ({correct}) exceeds graded answers ({graded})")]
    CountMismatch { correct: u32, graded: usize },
}

/// Per-category correctness counts stored on the session record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryCounts {
    pub multiple_choice_correct: u32,
    pub open_ended_correct: u32,
    pub vocabulary_correct: u32,
}

/// Persisted shape of one quiz session.
///
/// Written provisionally when the session starts and merged in place when it
/// finishes. Sessions are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: UserId,
    #[serde(default)]
    pub article_id: Option<ArticleId>,
    pub created_at: DateTime<Utc>,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_points: u32,
    pub earned_points: u32,
    pub accuracy: f64,
    /// Seconds between start and finish.
    pub total_time_spent: u64,
    #[serde(flatten)]
    pub counts: CategoryCounts,
    #[serde(default)]
    pub open_ended_scores: Vec<f64>,
}

impl SessionRecord {
    /// The record written at session start: nothing answered, nothing earned.
    #[must_use]
    pub fn provisional(id: SessionId, user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            article_id: None,
            created_at,
            completed: false,
            completed_at: None,
            total_points: 0,
            earned_points: 0,
            accuracy: 0.0,
            total_time_spent: 0,
            counts: CategoryCounts::default(),
            open_ended_scores: Vec::new(),
        }
    }

    /// Marks the session finished with its final totals.
    ///
    /// Accuracy is derived from `earned_points` / `total_points`.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        &mut self,
        article_id: ArticleId,
        earned_points: u32,
        total_points: u32,
        total_time_spent: u64,
        counts: CategoryCounts,
        open_ended_scores: Vec<f64>,
        completed_at: DateTime<Utc>,
    ) {
        self.article_id = Some(article_id);
        self.completed = true;
        self.completed_at = Some(completed_at);
        self.earned_points = earned_points;
        self.total_points = total_points;
        self.accuracy = scoring::accuracy(earned_points, total_points);
        self.total_time_spent = total_time_spent;
        self.counts = counts;
        self.open_ended_scores = open_ended_scores;
    }

    /// Checks the record's internal consistency after loading it back.
    ///
    /// # Errors
    ///
    /// Returns `SessionRecordError` when accuracy, timestamps, or counts disagree.
    pub fn validate(&self) -> Result<(), SessionRecordError> {
        let expected = scoring::accuracy(self.earned_points, self.total_points);
        if (self.accuracy - expected).abs() > f64::EPSILON {
            return Err(SessionRecordError::AccuracyMismatch {
                stored: self.accuracy,
                expected,
            });
        }
        if let Some(completed_at) = self.completed_at {
            if completed_at < self.created_at {
                return Err(SessionRecordError::InvalidTimeRange);
            }
        }
        if self.counts.open_ended_correct as usize > self.open_ended_scores.len() {
            return Err(SessionRecordError::CountMismatch {
                correct: self.counts.open_ended_correct,
                graded: self.open_ended_scores.len(),
            });
        }
        Ok(())
    }
}
