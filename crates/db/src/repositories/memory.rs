use std::collections::HashMap;

use tokio::sync::RwLock;

use fred_core::{ConversationHistory, ConversationTurn, UserId};

use super::{HistoryRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    histories: RwLock<HashMap<UserId, ConversationHistory>>,
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn load(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError> {
        let histories = self.histories.read().await;
        Ok(histories.get(user_id).cloned().unwrap_or_default())
    }

    async fn append(
        &self,
        user_id: &UserId,
        turns: &[ConversationTurn],
        cap: usize,
    ) -> Result<(), RepositoryError> {
        let mut histories = self.histories.write().await;
        let history = histories.entry(user_id.clone()).or_default();
        for turn in turns {
            history.push(turn.clone());
        }
        history.evict_to(cap);
        Ok(())
    }

    async fn replace(
        &self,
        user_id: &UserId,
        history: ConversationHistory,
    ) -> Result<(), RepositoryError> {
        let mut histories = self.histories.write().await;
        histories.insert(user_id.clone(), history);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fred_core::{ConversationHistory, ConversationTurn, UserId};

    use crate::repositories::{HistoryRepository, InMemoryHistoryRepository};

    #[tokio::test]
    async fn in_memory_repo_caps_and_replaces() {
        let repo = InMemoryHistoryRepository::default();
        let ana = UserId("ana@example.org".to_owned());

        let turns: Vec<_> =
            (0..5).map(|index| ConversationTurn::user(format!("turn-{index}"), None)).collect();
        repo.append(&ana, &turns, 3).await.expect("append");

        let history = repo.load(&ana).await.expect("load");
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns()[0].text, "turn-2");

        repo.replace(&ana, ConversationHistory::empty()).await.expect("replace");
        assert!(repo.load(&ana).await.expect("load").is_empty());
    }
}
