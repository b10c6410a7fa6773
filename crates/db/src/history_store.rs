use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use fred_core::{ConversationHistory, ConversationTurn, UserId};

use crate::repositories::{HistoryRepository, RepositoryError};

type KeyLocks = HashMap<UserId, Arc<tokio::sync::Mutex<()>>>;

/// Bounded per-user conversation log.
///
/// Appends for one user are serialized through a per-key lock; appends for
/// different users proceed in parallel. Reads take no lock and may miss an
/// append that is still in flight.
pub struct HistoryStore {
    repository: Arc<dyn HistoryRepository>,
    max_turns: usize,
    locks: Mutex<KeyLocks>,
}

impl HistoryStore {
    pub fn new(repository: Arc<dyn HistoryRepository>, max_turns: usize) -> Self {
        Self { repository, max_turns: max_turns.max(1), locks: Mutex::new(HashMap::new()) }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Empty history for an unknown user; backend failures are still errors.
    pub async fn get(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError> {
        self.repository.load(user_id).await
    }

    pub async fn append(
        &self,
        user_id: &UserId,
        turn: ConversationTurn,
    ) -> Result<(), RepositoryError> {
        self.append_all(user_id, vec![turn]).await
    }

    /// Appends `turns` as one batch, then evicts the oldest turns beyond the cap.
    pub async fn append_all(
        &self,
        user_id: &UserId,
        turns: Vec<ConversationTurn>,
    ) -> Result<(), RepositoryError> {
        if turns.is_empty() {
            return Ok(());
        }

        let key_lock = self.key_lock(user_id);
        let result = {
            let _guard = key_lock.lock().await;
            self.repository.append(user_id, &turns, self.max_turns).await
        };
        drop(key_lock);
        self.prune_idle_locks();

        debug!(
            event_name = "db.history.appended",
            user_id = %user_id,
            turns = turns.len(),
            ok = result.is_ok(),
            "history append finished"
        );
        result
    }

    fn key_lock(&self, user_id: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.lock_table();
        Arc::clone(locks.entry(user_id.clone()).or_default())
    }

    // Entries only referenced by the table itself belong to no in-flight append.
    fn prune_idle_locks(&self) {
        self.lock_table().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn lock_table(&self) -> MutexGuard<'_, KeyLocks> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.lock_table().len()
    }
}
