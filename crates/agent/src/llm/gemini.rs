use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fred_core::config::LlmConfig;
use fred_core::{RetryPolicy, Role};

use super::{http_client, CompletionRequest, LlmClient, LlmError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` client. A failed call on the primary model is
/// repeated once on the fallback model when one is configured.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    fallback_model: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        fallback_model: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key,
            model: model.into(),
            fallback_model,
            timeout,
            retry,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Configuration("llm.api_key is required for gemini".into()))?;
        let client = Self::new(
            api_key,
            config.model.clone(),
            config.fallback_model.clone(),
            config.timeout(),
            RetryPolicy::with_retries(config.max_retries),
        )?;
        Ok(match &config.base_url {
            Some(base_url) => client.with_base_url(base_url.clone()),
            None => client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    async fn generate(&self, model: &str, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let body = GenerateContentRequest::from(request);

        self.retry
            .run(LlmError::is_retryable, |attempt| {
                let url = url.as_str();
                let body = &body;
                async move {
                    if attempt > 0 {
                        warn!(event_name = "agent.llm.retry", model, attempt, "retrying gemini call");
                    }
                    self.send_once(url, body).await
                }
            })
            .await
    }

    async fn send_once(
        &self,
        url: &str,
        body: &GenerateContentRequest,
    ) -> Result<String, LlmError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| LlmError::from_reqwest(error, self.timeout))?;

        let status = response.status();
        debug!(event_name = "agent.llm.response", status = %status, "gemini response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Decode(error.to_string()))?;
        payload.first_text().ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        match self.generate(&self.model, request).await {
            Ok(text) => Ok(text),
            Err(error) => match &self.fallback_model {
                Some(fallback) if fallback != &self.model => {
                    warn!(
                        event_name = "agent.llm.fallback",
                        model = %self.model,
                        fallback = %fallback,
                        error = %error,
                        "primary model failed, switching to fallback"
                    );
                    self.generate(fallback, request).await
                }
                _ => Err(error),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self { role: role.map(str::to_owned), parts: vec![Part { text: Some(text.to_owned()) }] }
    }
}

impl From<&CompletionRequest> for GenerateContentRequest {
    fn from(request: &CompletionRequest) -> Self {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Content::text(Some(role), &message.text)
            })
            .collect();
        contents.push(Content::text(Some("user"), &request.prompt));

        Self { system_instruction: Content::text(None, &request.system), contents }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
