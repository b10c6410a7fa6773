use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use fred_core::{ChatRequest, InterfaceError, ThreadContext, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Stream,
    Private,
}

/// The `message` object of a Zulip outgoing webhook.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ZulipMessage {
    pub content: String,
    /// Stream name for stream messages, recipient list for private ones.
    #[serde(default)]
    pub display_recipient: Value,
    pub sender_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WebhookPayload {
    pub message: ZulipMessage,
    pub token: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("stream message without a stream name")]
    MissingStream,
    #[error("message has no sender")]
    MissingSender,
}

impl WebhookPayload {
    /// Checks the shared webhook token without short-circuiting on the first
    /// differing byte.
    pub fn authenticate(
        &self,
        expected: &SecretString,
        correlation_id: &str,
    ) -> Result<(), InterfaceError> {
        let expected = expected.expose_secret().as_bytes();
        let provided = self.token.as_bytes();
        let mismatch = expected.len() != provided.len()
            || expected.iter().zip(provided).fold(0_u8, |acc, (a, b)| acc | (a ^ b)) != 0;

        if mismatch || expected.is_empty() {
            return Err(InterfaceError::unauthorized(correlation_id));
        }
        Ok(())
    }

    pub fn thread(&self) -> Result<ThreadContext, PayloadError> {
        match self.message.message_type {
            MessageType::Private => Ok(ThreadContext::Private),
            MessageType::Stream => {
                let stream = self
                    .message
                    .display_recipient
                    .as_str()
                    .filter(|name| !name.trim().is_empty())
                    .ok_or(PayloadError::MissingStream)?;
                Ok(ThreadContext::Stream {
                    stream: stream.to_owned(),
                    topic: self.message.subject.clone(),
                })
            }
        }
    }

    pub fn to_chat_request(&self) -> Result<ChatRequest, PayloadError> {
        let sender = self.message.sender_email.trim();
        if sender.is_empty() {
            return Err(PayloadError::MissingSender);
        }
        Ok(ChatRequest::new(UserId(sender.to_owned()), self.message.content.clone(), self.thread()?))
    }
}
