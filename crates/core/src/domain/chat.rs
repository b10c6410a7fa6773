use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identity; the sender email for Zulip.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a conversation is taking place on the messaging side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadContext {
    Private,
    Stream { stream: String, topic: String },
}

impl ThreadContext {
    pub fn label(&self) -> String {
        match self {
            Self::Private => "private".to_owned(),
            Self::Stream { stream, topic } => format!("{stream} > {topic}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub correlation_id: String,
    pub user_id: UserId,
    pub text: String,
    pub thread: ThreadContext,
}

impl ChatRequest {
    pub fn new(user_id: UserId, text: impl Into<String>, thread: ThreadContext) -> Self {
        Self { correlation_id: Uuid::new_v4().to_string(), user_id, text: text.into(), thread }
    }

    pub fn delivery_target(&self) -> DeliveryTarget {
        DeliveryTarget { recipient: self.user_id.clone(), thread: self.thread.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub recipient: UserId,
    pub thread: ThreadContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub delivery_target: DeliveryTarget,
}

/// Instructions the caller must carry out after a run completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    Deliver { target: DeliveryTarget, text: String },
}

impl ChatResponse {
    pub fn delivery(&self) -> SideEffect {
        SideEffect::Deliver { target: self.delivery_target.clone(), text: self.text.clone() }
    }
}
