use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use quiz_core::Clock;
use quiz_core::model::{
    ArticleId, CategoryCounts, MultipleChoiceResponse, OPEN_ENDED_PASS_THRESHOLD,
    OpenEndedResponse, QuestionNumber, SessionId, SessionRecord, UserId, checked_score,
};
use quiz_core::scoring::{self, QuestionTally};
use storage::document::{CollectionPath, to_document};
use storage::{DocumentStore, WriteBatch, paths};

use super::documents::TaggedResponse;
use super::state::{TrackerEvent, TrackerState};
use super::writer::{PendingWrite, WriteOp, WriteQueue};
use crate::error::{TrackerError, WriteFailure, WriteKind};
use crate::identity::IdentityProvider;

const EVENT_CAPACITY: usize = 64;

/// Accumulates answer outcomes for one session at a time and persists them.
///
/// Counting happens in memory; the store is only touched at session start,
/// when the multiple-choice section is completed, at finish, and for explicit
/// single-response saves. Store writes go through a background writer so the
/// caller never waits on them, and they are applied in the order issued.
///
/// The writer task is spawned on first write, so the tracker must be used
/// from within a tokio runtime.
pub struct SessionTracker {
    clock: Clock,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    state: TrackerState,
    events: broadcast::Sender<TrackerEvent>,
    sink: Option<mpsc::UnboundedSender<WriteFailure>>,
    writer: Option<WriteQueue>,
}

impl SessionTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clock,
            store,
            identity,
            state: TrackerState::default(),
            events,
            sink: None,
            writer: None,
        }
    }

    /// Forward every failed write to `sink` in addition to logging it.
    ///
    /// Must be set before the first write to take effect.
    #[must_use]
    pub fn with_error_sink(mut self, sink: mpsc::UnboundedSender<WriteFailure>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the clock (usually for deterministic testing).
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Current time according to the tracker's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Receive a `TrackerEvent` for every state change and failed write.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn queue(&mut self) -> &WriteQueue {
        let (store, sink, events) = (&self.store, &self.sink, &self.events);
        self.writer
            .get_or_insert_with(|| {
                WriteQueue::spawn(Arc::clone(store), sink.clone(), events.clone())
            })
    }

    /// Answers can no longer change once the session is finished.
    fn ensure_open(&self) -> Result<(), TrackerError> {
        if self.state.is_finished() {
            return Err(TrackerError::SessionFinished);
        }
        Ok(())
    }

    fn context(&self) -> Result<(UserId, SessionId), TrackerError> {
        let user = self.identity.current_user().ok_or(TrackerError::NoUser)?;
        let session = self
            .state
            .session_id
            .clone()
            .ok_or(TrackerError::NoActiveSession)?;
        Ok((user, session))
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Begin a new session, discarding anything tracked so far.
    ///
    /// Writes a provisional session record keyed by `session_id`, or by a
    /// fresh identifier when none is given.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NoUser` (with no effect) when nobody is signed in,
    /// or `TrackerError::Storage` if the record cannot be encoded.
    pub fn start(&mut self, session_id: Option<SessionId>) -> Result<PendingWrite, TrackerError> {
        let user = self.identity.current_user().ok_or(TrackerError::NoUser)?;
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let now = self.clock.now();

        let path = paths::session_doc(&session_id)?;
        let record = SessionRecord::provisional(session_id.clone(), user, now);
        let doc = to_document(&record)?;

        self.state = TrackerState {
            session_id: Some(session_id.clone()),
            started_at: Some(now),
            ..TrackerState::default()
        };
        info!(session_id = %session_id, "session started");
        self.emit(TrackerEvent::Started {
            session_id: session_id.clone(),
        });

        Ok(self.queue().enqueue(
            WriteKind::CreateSession,
            session_id.as_str(),
            WriteOp::Set(path, doc),
        ))
    }

    /// Lock the multiple-choice section and persist its responses as one batch.
    ///
    /// Calling it again after the section is locked does nothing.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NoUser` or `TrackerError::NoActiveSession` (with
    /// no effect) when there is nobody to attribute the responses to.
    pub fn complete_multiple_choice_section(&mut self) -> Result<PendingWrite, TrackerError> {
        if self.state.multiple_choice_locked {
            return Ok(PendingWrite::nothing());
        }
        let (user, session_id) = self.context()?;
        let collection = paths::multiple_choice_responses(&session_id)?;

        let batch = tagged_batch(
            &collection,
            &self.state.multiple_choice_responses,
            |r| r.question_number,
            &user,
            &session_id,
            None,
        );

        self.state.multiple_choice_locked = true;
        let responses = self.state.multiple_choice_responses.len();
        debug!(session_id = %session_id, responses, "multiple-choice section completed");
        self.emit(TrackerEvent::MultipleChoiceSectionCompleted { responses });

        Ok(self.queue().enqueue(
            WriteKind::MultipleChoiceBatch,
            session_id.as_str(),
            WriteOp::Batch(batch),
        ))
    }

    /// Finalize the session record and persist the open-ended responses.
    ///
    /// Earned points come from the tracked counters; possible points come from
    /// `tally`. The record is merged into the provisional one written by
    /// `start`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NoUser` or `TrackerError::NoActiveSession` (with
    /// no effect), or `TrackerError::Storage` if the record cannot be encoded.
    pub fn finish(
        &mut self,
        article_id: ArticleId,
        tally: QuestionTally,
    ) -> Result<PendingWrite, TrackerError> {
        let (user, session_id) = self.context()?;
        let started_at = self.state.started_at.ok_or(TrackerError::NoActiveSession)?;
        let now = self.clock.now();

        let earned = scoring::points_earned(
            self.state.multiple_choice_correct,
            &self.state.open_ended_scores,
            self.state.vocabulary_correct,
        );
        let possible = tally.possible_points();
        let open_ended_correct = self
            .state
            .open_ended_scores
            .iter()
            .filter(|s| **s > OPEN_ENDED_PASS_THRESHOLD)
            .count();
        let counts = CategoryCounts {
            multiple_choice_correct: self.state.multiple_choice_correct,
            open_ended_correct: u32::try_from(open_ended_correct).unwrap_or(u32::MAX),
            vocabulary_correct: self.state.vocabulary_correct,
        };

        let mut record = SessionRecord::provisional(session_id.clone(), user.clone(), started_at);
        record.finalize(
            article_id.clone(),
            earned,
            possible,
            self.clock.seconds_since(started_at),
            counts,
            self.state.open_ended_scores.clone(),
            now,
        );
        let record_path = paths::session_doc(&session_id)?;
        let record_doc = to_document(&record)?;
        let collection = paths::open_ended_responses(&session_id)?;

        let batch = tagged_batch(
            &collection,
            &self.state.open_ended_responses,
            |r| r.question_number,
            &user,
            &session_id,
            Some(&article_id),
        );

        info!(
            session_id = %session_id,
            earned_points = record.earned_points,
            total_points = record.total_points,
            accuracy = record.accuracy,
            "session finished"
        );
        self.emit(TrackerEvent::Finished {
            earned_points: record.earned_points,
            total_points: record.total_points,
            accuracy: record.accuracy,
        });
        self.state.record = Some(record);

        let queue = self.queue();
        let finalize = queue.enqueue(
            WriteKind::FinalizeSession,
            session_id.as_str(),
            WriteOp::Merge(record_path, record_doc),
        );
        let responses = queue.enqueue(
            WriteKind::OpenEndedBatch,
            session_id.as_str(),
            WriteOp::Batch(batch),
        );
        Ok(finalize.and(responses))
    }

    /// Wait until every write issued so far has been applied.
    ///
    /// # Errors
    ///
    /// Returns a `WriteFailure` only if the writer itself has stopped; failures
    /// of earlier writes are reported on their own handles.
    pub async fn flush(&mut self) -> Result<(), WriteFailure> {
        let session_id = self
            .state
            .session_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.queue()
            .enqueue(WriteKind::Flush, &session_id, WriteOp::Barrier)
            .wait()
            .await
    }

    //
    // ─── TRACKING ──────────────────────────────────────────────────────────────
    //

    /// Record a multiple-choice answer in memory.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::SessionFinished` after `finish`,
    /// `TrackerError::SectionLocked` once the section is completed and
    /// `TrackerError::DuplicateQuestion` for a question already answered; all
    /// leave the tracker unchanged.
    pub fn track_multiple_choice(
        &mut self,
        is_correct: bool,
        question_number: QuestionNumber,
        question_text: impl Into<String>,
        student_choice: impl Into<String>,
        correct_choice: impl Into<String>,
    ) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if self.state.multiple_choice_locked {
            return Err(TrackerError::SectionLocked);
        }
        if self.state.has_multiple_choice(question_number) {
            return Err(TrackerError::DuplicateQuestion(question_number));
        }

        if is_correct {
            self.state.multiple_choice_correct += 1;
        }
        self.state
            .multiple_choice_responses
            .push(MultipleChoiceResponse {
                question_number,
                question_text: question_text.into(),
                student_choice: student_choice.into(),
                correct_choice: correct_choice.into(),
                is_correct,
                answered_at: self.clock.now(),
            });
        self.emit(TrackerEvent::MultipleChoiceTracked {
            question_number,
            is_correct,
        });
        Ok(())
    }

    /// Add an open-ended score to the running total, clamped into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::InvalidScore` for a non-finite score and
    /// `TrackerError::SessionFinished` after `finish`; neither changes state.
    pub fn track_open_ended(&mut self, score: f64) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let score = checked_score(score)?;
        self.state.open_ended_scores.push(score);
        self.emit(TrackerEvent::OpenEndedTracked { score });
        Ok(())
    }

    /// Buffer a graded open-ended response until `finish`.
    ///
    /// The score is clamped into `[0, 1]` and `is_correct` follows from it.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::DuplicateQuestion` if the question already has a
    /// response, `TrackerError::InvalidScore` for a non-finite score and
    /// `TrackerError::SessionFinished` after `finish`.
    pub fn record_open_ended_response(
        &mut self,
        mut response: OpenEndedResponse,
    ) -> Result<(), TrackerError> {
        self.ensure_open()?;
        let question_number = response.question_number;
        if self.state.has_open_ended(question_number) {
            return Err(TrackerError::DuplicateQuestion(question_number));
        }
        response.score = checked_score(response.score)?;
        response.is_correct = response.score > OPEN_ENDED_PASS_THRESHOLD;
        self.state.open_ended_responses.push(response);
        self.emit(TrackerEvent::OpenEndedRecorded { question_number });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TrackerError::SessionFinished` after `finish`.
    pub fn track_vocabulary(&mut self, is_correct: bool) -> Result<(), TrackerError> {
        self.ensure_open()?;
        if is_correct {
            self.state.vocabulary_correct += 1;
        }
        self.emit(TrackerEvent::VocabularyTracked { is_correct });
        Ok(())
    }

    /// Persist one open-ended response right away, outside the finish batch.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NoUser` or `TrackerError::NoActiveSession` (with
    /// no effect), or `TrackerError::Storage` if the response cannot be encoded.
    pub fn save_open_ended_response(
        &mut self,
        response: &OpenEndedResponse,
        article_id: &ArticleId,
    ) -> Result<PendingWrite, TrackerError> {
        let (user, session_id) = self.context()?;
        let collection = paths::open_ended_responses(&session_id)?;
        let path = paths::response_doc(&collection, response.question_number)?;
        let doc = TaggedResponse {
            response,
            user_id: &user,
            session_id: &session_id,
            article_id: Some(article_id),
        }
        .encode()?;

        Ok(self.queue().enqueue(
            WriteKind::OpenEndedResponse,
            session_id.as_str(),
            WriteOp::Set(path, doc),
        ))
    }
}

/// One document per response, keyed by question number.
///
/// A response that fails to encode is logged and left out; the rest still go.
fn tagged_batch<R: Serialize>(
    collection: &CollectionPath,
    responses: &[R],
    number_of: impl Fn(&R) -> QuestionNumber,
    user: &UserId,
    session_id: &SessionId,
    article_id: Option<&ArticleId>,
) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for response in responses {
        let number = number_of(response);
        let encoded = paths::response_doc(collection, number).and_then(|path| {
            TaggedResponse {
                response,
                user_id: user,
                session_id,
                article_id,
            }
            .encode()
            .map(|doc| (path, doc))
        });
        match encoded {
            Ok((path, doc)) => batch.set(path, doc),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    question_number = number.value(),
                    error = %e,
                    "skipping response that could not be encoded"
                );
            }
        }
    }
    batch
}

impl fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTracker")
            .field("clock", &self.clock)
            .field("state", &self.state)
            .field("has_error_sink", &self.sink.is_some())
            .field("writer_running", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::Evaluation;
    use quiz_core::time::fixed_now;

    fn graded(n: u32, score: f64) -> OpenEndedResponse {
        OpenEndedResponse::from_evaluation(
            QuestionNumber::new(n).unwrap(),
            format!("Q{n}"),
            "answer",
            Evaluation::new(score, "", "").unwrap(),
            fixed_now(),
        )
    }

    #[test]
    fn unencodable_response_is_left_out_of_the_batch() {
        let session_id = SessionId::new("s1");
        let collection = paths::open_ended_responses(&session_id).unwrap();
        let mut broken = graded(2, 0.5);
        broken.score = f64::NAN;
        let responses = vec![graded(1, 0.9), broken, graded(3, 0.2)];

        let batch = tagged_batch(
            &collection,
            &responses,
            |r| r.question_number,
            &UserId::new("u1"),
            &session_id,
            None,
        );

        let ids: Vec<&str> = batch.writes().iter().map(|(path, _)| path.id()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
