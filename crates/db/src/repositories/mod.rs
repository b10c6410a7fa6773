use async_trait::async_trait;
use thiserror::Error;

use fred_core::{ConversationHistory, ConversationTurn, UserId};

pub mod history;
pub mod memory;

pub use history::SqlHistoryRepository;
pub use memory::InMemoryHistoryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("history backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable per-user turn log. Implementations keep at most `cap` turns per user,
/// evicting the oldest first, and apply one `append` call as a single batch.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn load(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError>;

    async fn append(
        &self,
        user_id: &UserId,
        turns: &[ConversationTurn],
        cap: usize,
    ) -> Result<(), RepositoryError>;

    /// Replaces everything stored for `user_id`; used by history import.
    async fn replace(
        &self,
        user_id: &UserId,
        history: ConversationHistory,
    ) -> Result<(), RepositoryError>;
}
