//! Where session data lives in the document store.
//!
//! ```text
//! sessions/{session_id}
//! sessions/{session_id}/multiple_choice_responses/{question_number}
//! sessions/{session_id}/open_ended_responses/{question_number}
//! ```

use quiz_core::model::{QuestionNumber, SessionId};

use crate::document::{CollectionPath, DocumentPath};
use crate::repository::StorageError;

pub const SESSIONS: &str = "sessions";
pub const MULTIPLE_CHOICE_RESPONSES: &str = "multiple_choice_responses";
pub const OPEN_ENDED_RESPONSES: &str = "open_ended_responses";

/// Field every response document is ordered by on read-back.
pub const QUESTION_NUMBER_FIELD: &str = "question_number";

/// # Errors
///
/// Returns `StorageError::InvalidPath` if the session id is not a valid segment.
pub fn session_doc(session_id: &SessionId) -> Result<DocumentPath, StorageError> {
    CollectionPath::root(SESSIONS)?.doc(session_id.as_str())
}

/// # Errors
///
/// Returns `StorageError::InvalidPath` if the session id is not a valid segment.
pub fn multiple_choice_responses(session_id: &SessionId) -> Result<CollectionPath, StorageError> {
    session_doc(session_id)?.collection(MULTIPLE_CHOICE_RESPONSES)
}

/// # Errors
///
/// Returns `StorageError::InvalidPath` if the session id is not a valid segment.
pub fn open_ended_responses(session_id: &SessionId) -> Result<CollectionPath, StorageError> {
    session_doc(session_id)?.collection(OPEN_ENDED_RESPONSES)
}

/// Response documents are keyed by their question number.
///
/// # Errors
///
/// Never fails for a valid collection; the signature mirrors `CollectionPath::doc`.
pub fn response_doc(
    collection: &CollectionPath,
    number: QuestionNumber,
) -> Result<DocumentPath, StorageError> {
    collection.doc(number.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_paths_nest_under_the_session() {
        let sid = SessionId::new("abc");
        let col = open_ended_responses(&sid).unwrap();
        let doc = response_doc(&col, QuestionNumber::new(4).unwrap()).unwrap();
        assert_eq!(doc.to_string(), "sessions/abc/open_ended_responses/4");
    }

    #[test]
    fn slash_in_session_id_is_rejected() {
        let sid = SessionId::new("a/b");
        assert!(session_doc(&sid).is_err());
    }
}
