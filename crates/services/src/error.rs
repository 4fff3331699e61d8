//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionNumber, ResponseError, SessionRecordError};
use storage::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SessionTracker`.
///
/// None of these leave the tracker in a partially updated state: an operation
/// that fails has no effect.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("no signed-in user")]
    NoUser,
    #[error("no active session")]
    NoActiveSession,
    #[error("multiple-choice section already completed")]
    SectionLocked,
    #[error("session already finished")]
    SessionFinished,
    #[error(transparent)]
    InvalidScore(#[from] ResponseError),
    #[error("question {0} already has a response")]
    DuplicateQuestion(QuestionNumber),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A store write that did not go through.
///
/// Writes are never retried; in-memory tracker state is left as it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} write for session {session_id} failed: {message}")]
pub struct WriteFailure {
    pub kind: WriteKind,
    pub session_id: String,
    pub message: String,
}

/// Which tracker operation a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    CreateSession,
    FinalizeSession,
    MultipleChoiceBatch,
    OpenEndedBatch,
    OpenEndedResponse,
    Flush,
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WriteKind::CreateSession => "create-session",
            WriteKind::FinalizeSession => "finalize-session",
            WriteKind::MultipleChoiceBatch => "multiple-choice-batch",
            WriteKind::OpenEndedBatch => "open-ended-batch",
            WriteKind::OpenEndedResponse => "open-ended-response",
            WriteKind::Flush => "flush",
        };
        f.write_str(label)
    }
}

/// Errors emitted by scoring oracles.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OracleError {
    #[error("scoring oracle is not configured")]
    Disabled,
    #[error("scoring oracle returned an empty response")]
    EmptyResponse,
    #[error("scoring oracle request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("scoring oracle reply could not be parsed: {0}")]
    MalformedReply(String),
}

/// Errors emitted while reading a finished session back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultsError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Record(#[from] SessionRecordError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
