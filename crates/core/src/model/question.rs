use serde::{Deserialize, Serialize};

use crate::model::{ArticleId, QuestionNumber};

/// The reading passage a question set is built around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub body: String,
}

impl Article {
    #[must_use]
    pub fn new(id: ArticleId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoiceQuestion {
    pub number: QuestionNumber,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: String,
}

impl MultipleChoiceQuestion {
    /// Returns true when `choice` is the keyed option.
    #[must_use]
    pub fn is_correct(&self, choice: &str) -> bool {
        self.correct_option == choice
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEndedQuestion {
    pub number: QuestionNumber,
    pub text: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyWord {
    pub word: String,
    pub definition: String,
}
