use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use fred_core::config::ZulipConfig;
use fred_core::{ThreadContext, UserId};

use crate::sender::{DeliveryError, MessageSender};

/// Posts bot messages through the Zulip REST API with HTTP basic auth.
pub struct ZulipClient {
    http: reqwest::Client,
    site: String,
    bot_email: String,
    api_key: SecretString,
    timeout: Duration,
}

impl ZulipClient {
    pub fn new(
        site: impl Into<String>,
        bot_email: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            DeliveryError::Configuration(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self {
            http,
            site: site.into().trim_end_matches('/').to_owned(),
            bot_email: bot_email.into(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &ZulipConfig) -> Result<Self, DeliveryError> {
        Self::new(
            config.site.clone(),
            config.bot_email.clone(),
            config.bot_api_key.clone(),
            config.send_timeout(),
        )
    }

    fn messages_url(&self) -> String {
        format!("{}/api/v1/messages", self.site)
    }
}

/// Form fields for one message. Stream replies go to the stream and topic the
/// question came from; private replies go back to the sender.
pub fn message_form(recipient: &UserId, thread: &ThreadContext, text: &str) -> Vec<(String, String)> {
    match thread {
        ThreadContext::Stream { stream, topic } => vec![
            ("type".to_owned(), "stream".to_owned()),
            ("to".to_owned(), stream.clone()),
            ("subject".to_owned(), topic.clone()),
            ("content".to_owned(), text.to_owned()),
        ],
        ThreadContext::Private => vec![
            ("type".to_owned(), "private".to_owned()),
            ("to".to_owned(), serde_json::json!([recipient.0]).to_string()),
            ("content".to_owned(), text.to_owned()),
        ],
    }
}

#[async_trait]
impl MessageSender for ZulipClient {
    async fn send(
        &self,
        recipient: &UserId,
        thread: &ThreadContext,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.bot_email, Some(self.api_key.expose_secret()))
            .form(&message_form(recipient, thread, text))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    DeliveryError::Timeout(self.timeout)
                } else {
                    DeliveryError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "zulip.send.rejected",
                status = status.as_u16(),
                thread = %thread.label(),
                "zulip rejected outbound message"
            );
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }

        debug!(event_name = "zulip.send.delivered", thread = %thread.label(), "message delivered");
        Ok(())
    }
}
