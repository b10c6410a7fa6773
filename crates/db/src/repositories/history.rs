use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use fred_core::{ConversationHistory, ConversationTurn, Intent, Role, UserId};

use super::{HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn load(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT role, text, intent, created_at
            FROM conversation_turn
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        let turns = rows.iter().map(turn_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(ConversationHistory::new(turns))
    }

    async fn append(
        &self,
        user_id: &UserId,
        turns: &[ConversationTurn],
        cap: usize,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_turns(&mut tx, user_id, turns).await?;

        sqlx::query(
            r#"
            DELETE FROM conversation_turn
            WHERE user_id = ?
              AND id NOT IN (
                SELECT id FROM conversation_turn
                WHERE user_id = ?
                ORDER BY id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(&user_id.0)
        .bind(&user_id.0)
        .bind(i64::try_from(cap).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace(
        &self,
        user_id: &UserId,
        history: ConversationHistory,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_turn WHERE user_id = ?")
            .bind(&user_id.0)
            .execute(&mut *tx)
            .await?;
        insert_turns(&mut tx, user_id, history.turns()).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_turns(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &UserId,
    turns: &[ConversationTurn],
) -> Result<(), RepositoryError> {
    for turn in turns {
        sqlx::query(
            r#"
            INSERT INTO conversation_turn (user_id, role, text, intent, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user_id.0)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(turn.intent.map(|intent| intent.as_str()))
        .bind(turn.timestamp.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn turn_from_row(row: &SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let role: String = row.try_get("role")?;
    let intent: Option<String> = row.try_get("intent")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ConversationTurn {
        role: role
            .parse::<Role>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        text: row.try_get("text")?,
        timestamp: parse_timestamp("created_at", &created_at)?,
        intent: intent
            .map(|label| {
                Intent::from_label(&label)
                    .ok_or_else(|| RepositoryError::Decode(format!("invalid intent: {label}")))
            })
            .transpose()?,
    })
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

#[cfg(test)]
mod tests {
    use fred_core::{ConversationHistory, ConversationTurn, Intent, Role, UserId};

    use super::SqlHistoryRepository;
    use crate::repositories::HistoryRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn user(email: &str) -> UserId {
        UserId(email.to_owned())
    }

    #[tokio::test]
    async fn missing_user_loads_empty_history() {
        let repo = SqlHistoryRepository::new(setup_pool().await);
        let history = repo.load(&user("nobody@example.org")).await.expect("load");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn append_round_trips_role_intent_and_timestamp() {
        let repo = SqlHistoryRepository::new(setup_pool().await);
        let ana = user("ana@example.org");
        let question = ConversationTurn::user("How many languages?", Some(Intent::Database));
        let answer = ConversationTurn::assistant("There are 12.", Some(Intent::Database));

        repo.append(&ana, &[question.clone(), answer.clone()], 20).await.expect("append");

        let history = repo.load(&ana).await.expect("load");
        assert_eq!(history.turns(), &[question, answer]);
    }

    #[tokio::test]
    async fn append_evicts_oldest_beyond_cap() {
        let repo = SqlHistoryRepository::new(setup_pool().await);
        let ana = user("ana@example.org");

        for index in 0..7 {
            let turn = ConversationTurn::user(format!("turn-{index}"), None);
            repo.append(&ana, &[turn], 4).await.expect("append");
        }

        let history = repo.load(&ana).await.expect("load");
        let texts: Vec<_> = history.turns().iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, vec!["turn-3", "turn-4", "turn-5", "turn-6"]);
    }

    #[tokio::test]
    async fn eviction_is_scoped_to_one_user() {
        let repo = SqlHistoryRepository::new(setup_pool().await);
        let ana = user("ana@example.org");
        let ben = user("ben@example.org");

        repo.append(&ben, &[ConversationTurn::user("ben-1", None)], 2).await.expect("append");
        for index in 0..5 {
            repo.append(&ana, &[ConversationTurn::user(format!("ana-{index}"), None)], 2)
                .await
                .expect("append");
        }

        assert_eq!(repo.load(&ana).await.expect("load ana").len(), 2);
        assert_eq!(repo.load(&ben).await.expect("load ben").len(), 1);
    }

    #[tokio::test]
    async fn replace_overwrites_existing_turns() {
        let repo = SqlHistoryRepository::new(setup_pool().await);
        let ana = user("ana@example.org");
        repo.append(&ana, &[ConversationTurn::user("stale", None)], 20).await.expect("append");

        let imported = ConversationHistory::new(vec![
            ConversationTurn::user("imported question", None),
            ConversationTurn::assistant("imported answer", None),
        ]);
        repo.replace(&ana, imported).await.expect("replace");

        let history = repo.load(&ana).await.expect("load");
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].text, "imported question");
        assert_eq!(history.turns()[1].role, Role::Assistant);
    }
}
