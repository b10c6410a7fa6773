use std::sync::Arc;

use fred_core::{ConversationTurn, Intent, Role, UserId};
use fred_db::migrations::run_pending;
use fred_db::{connect_with_settings, HistoryStore, SqlHistoryRepository};

async fn sqlite_store(cap: usize) -> HistoryStore {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    run_pending(&pool).await.expect("migrations");
    HistoryStore::new(Arc::new(SqlHistoryRepository::new(pool)), cap)
}

#[tokio::test]
async fn sqlite_backed_store_keeps_last_n_turns() {
    let store = sqlite_store(4).await;
    let ana = UserId("ana@example.org".to_owned());

    for index in 0..3 {
        store
            .append_all(
                &ana,
                vec![
                    ConversationTurn::user(format!("question {index}"), Some(Intent::Chatbot)),
                    ConversationTurn::assistant(format!("answer {index}"), Some(Intent::Chatbot)),
                ],
            )
            .await
            .expect("append batch");
    }

    let history = store.get(&ana).await.expect("get");
    let texts: Vec<_> = history.turns().iter().map(|turn| turn.text.as_str()).collect();
    assert_eq!(texts, vec!["question 1", "answer 1", "question 2", "answer 2"]);
    assert_eq!(history.turns()[0].role, Role::User);
    assert_eq!(history.turns()[3].role, Role::Assistant);
}

#[tokio::test]
async fn sqlite_backed_store_serves_unknown_users_empty() {
    let store = sqlite_store(20).await;
    let history = store.get(&UserId("first-contact@example.org".to_owned())).await.expect("get");
    assert!(history.is_empty());
}
