use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use fred_core::{DeliveryTarget, SideEffect, ThreadContext, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("message delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("message delivery transport failed: {0}")]
    Transport(String),
    #[error("messaging API rejected the message with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("messaging client misconfigured: {0}")]
    Configuration(String),
}

/// Outbound side of the chat platform. Sends are not idempotent, so callers
/// must not retry them.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        recipient: &UserId,
        thread: &ThreadContext,
        text: &str,
    ) -> Result<(), DeliveryError>;

    async fn deliver(&self, target: &DeliveryTarget, text: &str) -> Result<(), DeliveryError> {
        self.send(&target.recipient, &target.thread, text).await
    }

    async fn perform(&self, effect: &SideEffect) -> Result<(), DeliveryError> {
        match effect {
            SideEffect::Deliver { target, text } => self.deliver(target, text).await,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: UserId,
    pub thread: ThreadContext,
    pub text: String,
}

/// Keeps every message in memory instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: bool,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self { sent: Arc::default(), fail: true }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(
        &self,
        recipient: &UserId,
        thread: &ThreadContext,
        text: &str,
    ) -> Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Transport("recording sender set to fail".to_owned()));
        }
        let message =
            SentMessage { recipient: recipient.clone(), thread: thread.clone(), text: text.to_owned() };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}
