use chrono::{DateTime, Utc};

use quiz_core::model::{
    MultipleChoiceResponse, OpenEndedResponse, QuestionNumber, SessionId, SessionRecord,
};

use crate::error::WriteFailure;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// `start` has not been called yet.
    Idle,
    Open,
    /// Multiple-choice answers are final; other categories are still open.
    MultipleChoiceLocked,
    Finished,
}

/// Snapshot of everything a tracker has accumulated for the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub(crate) session_id: Option<SessionId>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) multiple_choice_locked: bool,
    pub(crate) multiple_choice_correct: u32,
    pub(crate) vocabulary_correct: u32,
    pub(crate) open_ended_scores: Vec<f64>,
    pub(crate) multiple_choice_responses: Vec<MultipleChoiceResponse>,
    pub(crate) open_ended_responses: Vec<OpenEndedResponse>,
    pub(crate) record: Option<SessionRecord>,
}

impl TrackerState {
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.record.as_ref().is_some_and(|r| r.completed) {
            SessionPhase::Finished
        } else if self.multiple_choice_locked {
            SessionPhase::MultipleChoiceLocked
        } else if self.session_id.is_some() {
            SessionPhase::Open
        } else {
            SessionPhase::Idle
        }
    }

    #[must_use]
    pub fn is_multiple_choice_locked(&self) -> bool {
        self.multiple_choice_locked
    }

    #[must_use]
    pub fn multiple_choice_correct(&self) -> u32 {
        self.multiple_choice_correct
    }

    #[must_use]
    pub fn vocabulary_correct(&self) -> u32 {
        self.vocabulary_correct
    }

    #[must_use]
    pub fn open_ended_scores(&self) -> &[f64] {
        &self.open_ended_scores
    }

    #[must_use]
    pub fn multiple_choice_responses(&self) -> &[MultipleChoiceResponse] {
        &self.multiple_choice_responses
    }

    #[must_use]
    pub fn open_ended_responses(&self) -> &[OpenEndedResponse] {
        &self.open_ended_responses
    }

    /// The finalized record, once `finish` has run.
    #[must_use]
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.phase() == SessionPhase::Finished
    }

    pub(crate) fn has_multiple_choice(&self, number: QuestionNumber) -> bool {
        self.multiple_choice_responses
            .iter()
            .any(|r| r.question_number == number)
    }

    pub(crate) fn has_open_ended(&self, number: QuestionNumber) -> bool {
        self.open_ended_responses
            .iter()
            .any(|r| r.question_number == number)
    }
}

/// Change notifications published by a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Started {
        session_id: SessionId,
    },
    MultipleChoiceTracked {
        question_number: QuestionNumber,
        is_correct: bool,
    },
    OpenEndedTracked {
        score: f64,
    },
    OpenEndedRecorded {
        question_number: QuestionNumber,
    },
    VocabularyTracked {
        is_correct: bool,
    },
    MultipleChoiceSectionCompleted {
        responses: usize,
    },
    Finished {
        earned_points: u32,
        total_points: u32,
        accuracy: f64,
    },
    WriteFailed(WriteFailure),
}
