use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use fred_core::{ConversationHistory, FailureReason, SqlCandidate};
use fred_db::{QueryError, QueryExecutor};

use crate::guardrails::SqlSafetyGuard;
use crate::model::TextModel;

pub const UNSAFE_QUERY_APOLOGY: &str = "I can't run that query safely.";
pub const GENERATION_APOLOGY: &str =
    "Sorry, I couldn't turn that into a database lookup. Could you rephrase the question?";
pub const EXECUTION_APOLOGY: &str =
    "Sorry, I couldn't retrieve that data right now. Please try again in a little while.";
pub const TIMEOUT_APOLOGY: &str =
    "Sorry, that lookup took too long. Try narrowing the question down.";
pub const SUMMARY_APOLOGY: &str =
    "Sorry, I found the data but couldn't put an answer together. Please try again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub query_timeout: Duration,
    pub max_summary_rows: usize,
}

/// What one pipeline run produced. `text` is always safe to show the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineAnswer {
    pub text: String,
    pub failure: Option<FailureReason>,
    pub row_count: Option<usize>,
}

impl PipelineAnswer {
    fn answered(text: String, row_count: usize) -> Self {
        Self { text, failure: None, row_count: Some(row_count) }
    }

    fn apology(text: &str, failure: FailureReason) -> Self {
        Self { text: text.to_owned(), failure: Some(failure), row_count: None }
    }
}

/// Question -> SQL -> guard -> warehouse -> summary. Never returns an error.
pub struct QueryPipeline {
    model: Arc<dyn TextModel>,
    guard: SqlSafetyGuard,
    executor: Arc<dyn QueryExecutor>,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        model: Arc<dyn TextModel>,
        executor: Arc<dyn QueryExecutor>,
        settings: PipelineSettings,
    ) -> Self {
        Self { model, guard: SqlSafetyGuard::new(), executor, settings }
    }

    pub async fn answer(&self, text: &str, recent_history: &ConversationHistory) -> PipelineAnswer {
        let candidate = match self.model.generate_sql(text, recent_history).await {
            Ok(candidate) => candidate,
            Err(error) => {
                warn!(event_name = "agent.pipeline.generation_failed", error = %error, "sql generation failed");
                return PipelineAnswer::apology(GENERATION_APOLOGY, FailureReason::GenerationFailed);
            }
        };

        let verdict = self.guard.validate(&candidate);
        if let Some(reason) = verdict.reason.filter(|_| !verdict.is_allowed()) {
            warn!(
                event_name = "agent.pipeline.sql_rejected",
                reason = %reason,
                detail = verdict.detail.as_deref().unwrap_or(""),
                "generated sql rejected by safety guard"
            );
            debug!(event_name = "agent.pipeline.sql_rejected", sql = %candidate.raw_text, "rejected statement");
            return PipelineAnswer::apology(UNSAFE_QUERY_APOLOGY, FailureReason::SqlRejected(reason));
        }

        self.execute_and_summarize(text, &candidate).await
    }

    async fn execute_and_summarize(&self, question: &str, candidate: &SqlCandidate) -> PipelineAnswer {
        let mut rows = match self
            .executor
            .run_select(&candidate.raw_text, self.settings.query_timeout)
            .await
        {
            Ok(rows) => rows,
            Err(QueryError::Timeout(limit)) => {
                warn!(event_name = "agent.pipeline.execution_timeout", timeout_ms = limit.as_millis() as u64, "query timed out");
                return PipelineAnswer::apology(TIMEOUT_APOLOGY, FailureReason::ExecutionTimeout);
            }
            Err(error) => {
                warn!(event_name = "agent.pipeline.execution_failed", error = %error, "query execution failed");
                return PipelineAnswer::apology(EXECUTION_APOLOGY, FailureReason::ExecutionFailed);
            }
        };

        let dropped = rows.truncate(self.settings.max_summary_rows);
        let row_count = rows.len();
        info!(event_name = "agent.pipeline.query_completed", rows = row_count, dropped, "query completed");

        match self.model.summarize(question, &rows, dropped).await {
            Ok(summary) => PipelineAnswer::answered(summary, row_count + dropped),
            Err(error) => {
                warn!(event_name = "agent.pipeline.summarization_failed", error = %error, "summarization failed");
                PipelineAnswer::apology(SUMMARY_APOLOGY, FailureReason::SummarizationFailed)
            }
        }
    }
}
