use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fred_core::config::LlmConfig;
use fred_core::{RetryPolicy, Role};

use super::{http_client, CompletionRequest, LlmClient, LlmError};

/// Local model served by Ollama's `/api/chat` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            timeout,
            retry,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| LlmError::Configuration("llm.base_url is required for ollama".into()))?;
        Self::new(
            base_url,
            config.model.clone(),
            config.timeout(),
            RetryPolicy::with_retries(config.max_retries),
        )
    }

    async fn send_once(&self, body: &ChatBody<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|error| LlmError::from_reqwest(error, self.timeout))?;

        let status = response.status();
        debug!(event_name = "agent.llm.response", status = %status, "ollama response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let payload: ChatResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        let text = payload.message.map(|message| message.content).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessageBody { role: "system", content: &request.system });
        for message in &request.history {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ChatMessageBody { role, content: &message.text });
        }
        messages.push(ChatMessageBody { role: "user", content: &request.prompt });

        let body = ChatBody { model: &self.model, messages, stream: false };
        self.retry
            .run(LlmError::is_retryable, |attempt| {
                let body = &body;
                async move {
                    if attempt > 0 {
                        warn!(event_name = "agent.llm.retry", attempt, "retrying ollama call");
                    }
                    self.send_once(body).await
                }
            })
            .await
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}
