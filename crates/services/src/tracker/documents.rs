//! Store-side shape of response documents.

use serde::Serialize;

use quiz_core::model::{ArticleId, SessionId, UserId};
use storage::document::{Document, to_document};
use storage::StorageError;

/// A response tagged with who answered it and where.
///
/// The response's own fields are flattened into the document so that it can
/// be decoded straight back into the response type.
#[derive(Debug, Serialize)]
pub(crate) struct TaggedResponse<'a, R> {
    #[serde(flatten)]
    pub response: &'a R,
    pub user_id: &'a UserId,
    pub session_id: &'a SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<&'a ArticleId>,
}

impl<R: Serialize> TaggedResponse<'_, R> {
    pub(crate) fn encode(&self) -> Result<Document, StorageError> {
        to_document(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{MultipleChoiceResponse, QuestionNumber};
    use quiz_core::time::fixed_now;
    use storage::document::from_document;

    #[test]
    fn tagged_response_decodes_back_into_the_response() {
        let response = MultipleChoiceResponse {
            question_number: QuestionNumber::new(2).unwrap(),
            question_text: "Which?".into(),
            student_choice: "B".into(),
            correct_choice: "C".into(),
            is_correct: false,
            answered_at: fixed_now(),
        };
        let user = UserId::new("u1");
        let session = SessionId::new("s1");
        let doc = TaggedResponse {
            response: &response,
            user_id: &user,
            session_id: &session,
            article_id: None,
        }
        .encode()
        .unwrap();

        assert_eq!(doc["user_id"], "u1");
        assert_eq!(doc["session_id"], "s1");
        assert_eq!(doc["question_number"], 2);
        assert!(!doc.contains_key("article_id"));

        let back: MultipleChoiceResponse = from_document(doc).unwrap();
        assert_eq!(back, response);
    }
}
