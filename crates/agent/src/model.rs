use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use fred_core::{ConversationHistory, QueryResult, SqlCandidate};

use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::prompts;

/// The four text-model operations the pipeline needs.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Raw label text; parsing into an intent is the classifier's job.
    async fn classify(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<String, LlmError>;

    async fn generate_sql(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<SqlCandidate, LlmError>;

    async fn summarize(
        &self,
        question: &str,
        rows: &QueryResult,
        dropped_rows: usize,
    ) -> Result<String, LlmError>;

    async fn converse(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<String, LlmError>;
}

/// Schema and rules text the SQL generator is grounded in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SqlPromptContext {
    pub schema: String,
    pub rules: String,
}

/// `TextModel` backed by an `LlmClient` and the fixed instruction sets.
pub struct PromptedModel {
    client: Arc<dyn LlmClient>,
    sql_system: String,
}

impl PromptedModel {
    pub fn new(client: Arc<dyn LlmClient>, context: &SqlPromptContext) -> Self {
        Self { client, sql_system: prompts::sql_instructions(&context.schema, &context.rules) }
    }
}

#[async_trait]
impl TextModel for PromptedModel {
    async fn classify(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(prompts::INTENT_INSTRUCTIONS, text)
            .with_history(history.turns());
        self.client.complete(&request).await
    }

    async fn generate_sql(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<SqlCandidate, LlmError> {
        let request =
            CompletionRequest::new(self.sql_system.clone(), text).with_history(history.turns());
        let output = self.client.complete(&request).await?;
        let candidate = SqlCandidate::from_model_output(&output);
        debug!(event_name = "agent.model.sql_generated", sql = %candidate.raw_text, "sql generated");
        Ok(candidate)
    }

    async fn summarize(
        &self,
        question: &str,
        rows: &QueryResult,
        dropped_rows: usize,
    ) -> Result<String, LlmError> {
        let prompt =
            prompts::summary_prompt(question, &rows.to_prompt_text(), rows.len(), dropped_rows);
        self.client.complete(&CompletionRequest::new(prompts::SUMMARY_INSTRUCTIONS, prompt)).await
    }

    async fn converse(
        &self,
        text: &str,
        history: &ConversationHistory,
    ) -> Result<String, LlmError> {
        let request =
            CompletionRequest::new(prompts::chatbot_system(), text).with_history(history.turns());
        self.client.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use fred_core::{ConversationHistory, ConversationTurn, QueryResult, QueryRow};

    use super::{PromptedModel, SqlPromptContext, TextModel};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};
    use crate::prompts;

    #[derive(Default)]
    struct RecordingClient {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().await.push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn model(reply: &str) -> (Arc<RecordingClient>, PromptedModel) {
        let client =
            Arc::new(RecordingClient { reply: reply.to_owned(), requests: Mutex::default() });
        let context = SqlPromptContext {
            schema: "CREATE TABLE languages (id INT, status VARCHAR(16))".to_owned(),
            rules: "Prefer COUNT(*) for counting questions".to_owned(),
        };
        let model = PromptedModel::new(client.clone(), &context);
        (client, model)
    }

    #[tokio::test]
    async fn generate_sql_strips_code_fence_and_embeds_schema() {
        let (client, model) = model("```sql\nSELECT COUNT(*) FROM languages\n```");
        let history = ConversationHistory::new(vec![ConversationTurn::user("earlier", None)]);

        let candidate = model.generate_sql("How many languages?", &history).await.expect("sql");
        assert_eq!(candidate.raw_text, "SELECT COUNT(*) FROM languages");

        let requests = client.requests.lock().await;
        assert!(requests[0].system.contains("CREATE TABLE languages"));
        assert!(requests[0].system.contains("Prefer COUNT(*)"));
        assert_eq!(requests[0].history.len(), 1);
        assert_eq!(requests[0].prompt, "How many languages?");
    }

    #[tokio::test]
    async fn classify_uses_intent_instructions() {
        let (client, model) = model("database");
        let label = model.classify("How many?", &ConversationHistory::empty()).await.expect("ok");

        assert_eq!(label, "database");
        assert_eq!(client.requests.lock().await[0].system, prompts::INTENT_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn summarize_sends_rows_without_history() {
        let (client, model) = model("There are 12 active languages.");
        let rows = QueryResult::new(vec![QueryRow::new(vec![("count".to_owned(), json!(12))])]);

        let answer = model.summarize("How many?", &rows, 0).await.expect("summary");
        assert_eq!(answer, "There are 12 active languages.");

        let requests = client.requests.lock().await;
        assert!(requests[0].history.is_empty());
        assert!(requests[0].prompt.contains("{\"count\":12}"));
    }
}
