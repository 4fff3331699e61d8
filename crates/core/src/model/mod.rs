mod ids;
mod question;
mod response;
mod session;

pub use ids::{ArticleId, ParseIdError, QuestionNumber, SessionId, UserId};
pub use question::{Article, MultipleChoiceQuestion, OpenEndedQuestion, VocabularyWord};
pub use response::{
    Evaluation, MultipleChoiceResponse, OPEN_ENDED_PASS_THRESHOLD, OpenEndedResponse,
    ResponseError, checked_score,
};
pub use session::{CategoryCounts, SessionRecord, SessionRecordError};
