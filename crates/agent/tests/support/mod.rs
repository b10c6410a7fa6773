#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use fred_agent::llm::LlmError;
use fred_agent::pipeline::PipelineSettings;
use fred_agent::{
    dispatcher_for, IntentClassifier, Orchestrator, QueryPipeline, RouteNodes, TextModel,
};
use fred_core::audit::InMemoryAuditSink;
use fred_core::{
    ChatRequest, ConversationHistory, ConversationTurn, QueryResult, QueryRow, SqlCandidate,
    ThreadContext, UserId,
};
use fred_db::{
    HistoryRepository, HistoryStore, InMemoryHistoryRepository, QueryError, QueryExecutor,
    RepositoryError,
};

/// Text model whose every answer is fixed up front. `None` means the call fails.
pub struct ScriptedModel {
    pub label: Option<String>,
    pub sql: Option<String>,
    pub summary: Option<String>,
    pub chat: Option<String>,
    pub delay: Duration,
    calls: Mutex<Vec<&'static str>>,
    summarized_rows: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            label: None,
            sql: None,
            summary: None,
            chat: None,
            delay: Duration::ZERO,
            calls: Mutex::default(),
            summarized_rows: Mutex::default(),
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_owned());
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_owned());
        self
    }

    pub fn chat(mut self, chat: &str) -> Self {
        self.chat = Some(chat.to_owned());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// `(rows shown, rows dropped)` for each summarize call.
    pub fn summarized_rows(&self) -> Vec<(usize, usize)> {
        self.summarized_rows.lock().expect("rows lock").clone()
    }

    async fn answer(&self, call: &'static str, scripted: &Option<String>) -> Result<String, LlmError> {
        self.calls.lock().expect("calls lock").push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        scripted.clone().ok_or_else(|| LlmError::Transport(format!("{call} unavailable")))
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn classify(
        &self,
        _text: &str,
        _history: &ConversationHistory,
    ) -> Result<String, LlmError> {
        self.answer("classify", &self.label).await
    }

    async fn generate_sql(
        &self,
        _text: &str,
        _history: &ConversationHistory,
    ) -> Result<SqlCandidate, LlmError> {
        self.answer("generate_sql", &self.sql).await.map(|sql| SqlCandidate::from_model_output(&sql))
    }

    async fn summarize(
        &self,
        _question: &str,
        rows: &QueryResult,
        dropped_rows: usize,
    ) -> Result<String, LlmError> {
        self.summarized_rows.lock().expect("rows lock").push((rows.len(), dropped_rows));
        self.answer("summarize", &self.summary).await
    }

    async fn converse(
        &self,
        _text: &str,
        _history: &ConversationHistory,
    ) -> Result<String, LlmError> {
        self.answer("converse", &self.chat).await
    }
}

pub enum ExecutorScript {
    Rows(QueryResult),
    Timeout,
    Failure,
}

/// Records every statement it is asked to run.
pub struct RecordingExecutor {
    script: ExecutorScript,
    statements: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new(script: ExecutorScript) -> Self {
        Self { script, statements: Mutex::default() }
    }

    pub fn rows(count: usize) -> Self {
        let rows = (0..count)
            .map(|index| QueryRow::new(vec![("n".to_owned(), json!(index))]))
            .collect();
        Self::new(ExecutorScript::Rows(QueryResult::new(rows)))
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().expect("statements lock").clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn run_select(&self, sql: &str, timeout: Duration) -> Result<QueryResult, QueryError> {
        self.statements.lock().expect("statements lock").push(sql.to_owned());
        match &self.script {
            ExecutorScript::Rows(rows) => Ok(rows.clone()),
            ExecutorScript::Timeout => Err(QueryError::Timeout(timeout)),
            ExecutorScript::Failure => Err(QueryError::Decode {
                column: "status".to_owned(),
                type_name: "GEOMETRY".to_owned(),
            }),
        }
    }
}

/// History backend that fails reads, writes, or both.
pub struct FailingHistoryRepository {
    pub fail_reads: bool,
    pub fail_writes: bool,
    inner: InMemoryHistoryRepository,
}

impl FailingHistoryRepository {
    pub fn writes() -> Self {
        Self { fail_reads: false, fail_writes: true, inner: InMemoryHistoryRepository::default() }
    }

    pub fn reads() -> Self {
        Self { fail_reads: true, fail_writes: false, inner: InMemoryHistoryRepository::default() }
    }

    pub fn everything() -> Self {
        Self { fail_reads: true, fail_writes: true, inner: InMemoryHistoryRepository::default() }
    }
}

#[async_trait]
impl HistoryRepository for FailingHistoryRepository {
    async fn load(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError> {
        if self.fail_reads {
            return Err(RepositoryError::Unavailable("read refused".to_owned()));
        }
        self.inner.load(user_id).await
    }

    async fn append(
        &self,
        user_id: &UserId,
        turns: &[ConversationTurn],
        cap: usize,
    ) -> Result<(), RepositoryError> {
        if self.fail_writes {
            return Err(RepositoryError::Unavailable("write refused".to_owned()));
        }
        self.inner.append(user_id, turns, cap).await
    }

    async fn replace(
        &self,
        user_id: &UserId,
        history: ConversationHistory,
    ) -> Result<(), RepositoryError> {
        self.inner.replace(user_id, history).await
    }
}

/// Reads succeed; appends never complete.
#[derive(Default)]
pub struct StallingHistoryRepository {
    inner: InMemoryHistoryRepository,
}

#[async_trait]
impl HistoryRepository for StallingHistoryRepository {
    async fn load(&self, user_id: &UserId) -> Result<ConversationHistory, RepositoryError> {
        self.inner.load(user_id).await
    }

    async fn append(
        &self,
        _user_id: &UserId,
        _turns: &[ConversationTurn],
        _cap: usize,
    ) -> Result<(), RepositoryError> {
        std::future::pending().await
    }

    async fn replace(
        &self,
        user_id: &UserId,
        history: ConversationHistory,
    ) -> Result<(), RepositoryError> {
        self.inner.replace(user_id, history).await
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings { query_timeout: Duration::from_secs(5), max_summary_rows: 50 }
}

pub fn pipeline(model: Arc<ScriptedModel>, executor: Arc<RecordingExecutor>) -> QueryPipeline {
    QueryPipeline::new(model, executor, settings())
}

/// Everything a scenario needs to inspect after a run.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: Arc<ScriptedModel>,
    pub executor: Arc<RecordingExecutor>,
    pub history: Arc<HistoryStore>,
    pub audit: Arc<InMemoryAuditSink>,
}

pub fn harness(
    graph_dispatch: bool,
    model: ScriptedModel,
    executor: RecordingExecutor,
    repository: Arc<dyn HistoryRepository>,
    total_timeout: Duration,
) -> Harness {
    let model = Arc::new(model);
    let executor = Arc::new(executor);
    let history = Arc::new(HistoryStore::new(repository, 20));
    let audit = Arc::new(InMemoryAuditSink::default());

    let nodes = RouteNodes::new(
        IntentClassifier::new(model.clone(), 6),
        model.clone(),
        QueryPipeline::new(model.clone(), executor.clone(), settings()),
    );
    let orchestrator = Orchestrator::new(
        history.clone(),
        nodes,
        dispatcher_for(graph_dispatch),
        audit.clone(),
        total_timeout,
    );

    Harness { orchestrator, model, executor, history, audit }
}

pub fn in_memory() -> Arc<dyn HistoryRepository> {
    Arc::new(InMemoryHistoryRepository::default())
}

pub fn request(text: &str) -> ChatRequest {
    ChatRequest::new(UserId("ana@example.org".to_owned()), text, ThreadContext::Private)
}
