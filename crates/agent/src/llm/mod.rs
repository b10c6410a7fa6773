use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use fred_core::config::{LlmConfig, LlmProvider};
use fred_core::{ConversationTurn, Role};

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model returned no text")]
    EmptyResponse,
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("invalid model configuration: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Model calls are read-only, so transient failures may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::EmptyResponse | Self::Decode(_) | Self::Configuration(_) => false,
        }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self { role: turn.role, text: turn.text.clone() }
    }
}

/// One model call: a fixed instruction set, optional prior turns, and the new user text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { system: system.into(), history: Vec::new(), prompt: prompt.into() }
    }

    pub fn with_history(mut self, turns: &[ConversationTurn]) -> Self {
        self.history = turns.iter().map(ChatMessage::from).collect();
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider {
        LlmProvider::Gemini => Ok(Arc::new(GeminiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::from_config(config)?)),
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| LlmError::Configuration(format!("failed to build HTTP client: {error}")))
}

#[cfg(test)]
mod tests {
    use fred_core::{ConversationTurn, Role};

    use super::{CompletionRequest, LlmError};

    #[test]
    fn transient_errors_are_retryable() {
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(LlmError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Transport("reset".to_owned()).is_retryable());
        assert!(!LlmError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::EmptyResponse.is_retryable());
    }

    #[test]
    fn request_carries_history_in_order() {
        let turns = vec![
            ConversationTurn::user("first", None),
            ConversationTurn::assistant("reply", None),
        ];
        let request = CompletionRequest::new("system", "second").with_history(&turns);

        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[0].role, Role::User);
        assert_eq!(request.history[1].text, "reply");
        assert_eq!(request.prompt, "second");
    }
}
