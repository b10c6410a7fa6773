use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    // `model` is the role name legacy history files use for assistant turns.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "model" => Ok(Self::Assistant),
            other => Err(DomainError::UnknownRole(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Option<Intent>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, intent: Option<Intent>) -> Self {
        Self { role: Role::User, text: text.into(), timestamp: Utc::now(), intent }
    }

    pub fn assistant(text: impl Into<String>, intent: Option<Intent>) -> Self {
        Self { role: Role::Assistant, text: text.into(), timestamp: Utc::now(), intent }
    }
}

/// Ordered, oldest-first log of turns for one user identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The newest `window` turns, still oldest-first.
    pub fn recent(&self, window: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    /// A copy holding only the newest `window` turns.
    pub fn window(&self, window: usize) -> Self {
        Self { turns: self.recent(window).to_vec() }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Drops the oldest turns until at most `cap` remain.
    pub fn evict_to(&mut self, cap: usize) -> usize {
        let overflow = self.turns.len().saturating_sub(cap);
        self.turns.drain(..overflow);
        overflow
    }

    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.turns
    }
}
