use std::env;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::Evaluation;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{OracleRequest, ScoringOracle};
use crate::error::OracleError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl OracleConfig {
    /// Reads `QUIZ_AI_*` variables; `None` when no API key is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("QUIZ_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url =
            env::var("QUIZ_AI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = env::var("QUIZ_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Some(Self {
            base_url,
            api_key,
            model,
            timeout: timeout_from_env(),
        })
    }
}

/// `QUIZ_ORACLE_TIMEOUT_SECS`, falling back to 30 seconds.
fn timeout_from_env() -> Duration {
    let secs = env::var("QUIZ_ORACLE_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Grades answers through an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmOracle {
    client: Client,
    config: Option<OracleConfig>,
}

impl LlmOracle {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(OracleConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<OracleConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Time budget callers should give a single grading request.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config
            .as_ref()
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), |c| c.timeout)
    }
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    async fn evaluate(
        &self,
        request: &OracleRequest<'_>,
    ) -> Result<Option<Evaluation>, OracleError> {
        let config = self.config.as_ref().ok_or(OracleError::Disabled)?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: grading_prompt(request),
                },
            ],
            temperature: 0.0,
        };

        debug!(model = %config.model, "requesting open-ended grade");
        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OracleError::EmptyResponse)?;

        parse_grade(&content)
    }
}

const SYSTEM_PROMPT: &str = "You grade reading-comprehension answers. \
Reply with a single JSON object: {\"score\": number between 0 and 1, \
\"feedback\": short note addressed to the student, \
\"reasoning\": why the score was given}. \
Use {\"score\": null} if the answer cannot be graded.";

fn grading_prompt(request: &OracleRequest<'_>) -> String {
    format!(
        "Article:\n{}\n\nQuestion:\n{}\n\nExpected answer:\n{}\n\nStudent answer:\n{}",
        request.article_text, request.question_text, request.expected_answer, request.student_answer
    )
}

/// Parses the model's JSON reply, tolerating a fenced code block around it.
fn parse_grade(content: &str) -> Result<Option<Evaluation>, OracleError> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if json.is_empty() {
        return Err(OracleError::EmptyResponse);
    }

    let reply: GradeReply =
        serde_json::from_str(json).map_err(|e| OracleError::MalformedReply(e.to_string()))?;

    let Some(score) = reply.score else {
        return Ok(None);
    };

    Evaluation::new(score, reply.feedback, reply.reasoning)
        .map(Some)
        .map_err(|e| OracleError::MalformedReply(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct GradeReply {
    score: Option<f64>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_reply() {
        let eval = parse_grade(r#"{"score": 0.75, "feedback": "Good", "reasoning": "Covers it"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(eval.score(), 0.75);
        assert_eq!(eval.feedback(), "Good");
        assert_eq!(eval.reasoning(), "Covers it");
    }

    #[test]
    fn parses_fenced_reply() {
        let content = "```json\n{\"score\": 1.0, \"feedback\": \"\", \"reasoning\": \"\"}\n```";
        let eval = parse_grade(content).unwrap().unwrap();
        assert_eq!(eval.score(), 1.0);
    }

    #[test]
    fn null_score_means_no_evaluation() {
        assert!(parse_grade(r#"{"score": null}"#).unwrap().is_none());
    }

    #[test]
    fn prose_reply_is_malformed() {
        let err = parse_grade("I think this is pretty good!").unwrap_err();
        assert!(matches!(err, OracleError::MalformedReply(_)));
    }

    #[tokio::test]
    async fn disabled_oracle_refuses_to_grade() {
        let oracle = LlmOracle::new(None);
        assert_eq!(oracle.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let request = OracleRequest {
            article_text: "a",
            question_text: "q",
            expected_answer: "e",
            student_answer: "s",
        };
        let err = oracle.evaluate(&request).await.unwrap_err();
        assert!(matches!(err, OracleError::Disabled));
    }
}
