//! Read-back of persisted sessions.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use quiz_core::model::{MultipleChoiceResponse, OpenEndedResponse, SessionId, SessionRecord};
use storage::document::{CollectionPath, from_document};
use storage::{DocumentStore, StorageError, paths};

use crate::error::ResultsError;

/// A session record with its responses, each list ordered by question number.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResults {
    pub record: SessionRecord,
    pub multiple_choice: Vec<MultipleChoiceResponse>,
    pub open_ended: Vec<OpenEndedResponse>,
}

#[derive(Clone)]
pub struct ResultsService {
    store: Arc<dyn DocumentStore>,
}

impl ResultsService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load a session and both of its response collections.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::NotFound` when no record exists,
    /// `ResultsError::Record` when the stored record is inconsistent, and
    /// `ResultsError::Storage` for read or decode failures.
    pub async fn load(&self, session_id: &SessionId) -> Result<SessionResults, ResultsError> {
        let record_doc = self
            .store
            .get(&paths::session_doc(session_id)?)
            .await?
            .ok_or(ResultsError::NotFound)?;
        let record: SessionRecord = from_document(record_doc)?;
        record.validate()?;

        let multiple_choice = self
            .list(&paths::multiple_choice_responses(session_id)?)
            .await?;
        let open_ended = self.list(&paths::open_ended_responses(session_id)?).await?;

        debug!(
            session_id = %session_id,
            multiple_choice = multiple_choice.len(),
            open_ended = open_ended.len(),
            "session loaded"
        );
        Ok(SessionResults {
            record,
            multiple_choice,
            open_ended,
        })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<T>, StorageError> {
        self.store
            .list_ordered(collection, paths::QUESTION_NUMBER_FIELD)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

impl std::fmt::Debug for ResultsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsService").finish_non_exhaustive()
    }
}
