use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use fred_agent::pipeline::PipelineSettings;
use fred_agent::{
    build_client, dispatcher_for, IntentClassifier, LlmError, Orchestrator, PromptedModel,
    QueryPipeline, RouteNodes, SqlPromptContext,
};
use fred_core::audit::{AuditEvent, AuditSink};
use fred_core::config::{AppConfig, ConfigError, LoadOptions};
use fred_core::RetryPolicy;
use fred_db::{
    connect_warehouse, connect_with_settings, migrations, DbPool, HistoryStore, MySqlQueryExecutor,
    SqlHistoryRepository,
};
use fred_zulip::{DeliveryError, MessageSender, ZulipClient};

/// Everything the server needs, built once at startup and passed down explicitly.
pub struct Application {
    pub config: AppConfig,
    pub history_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub sender: Arc<dyn MessageSender>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("history database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("history database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("warehouse pool could not be created: {0}")]
    Warehouse(#[source] sqlx::Error),
    #[error("could not read prompt context `{path}`: {source}")]
    PromptContext { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Zulip(#[from] DeliveryError),
}

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_event = %event.event_type,
            correlation_id = %event.correlation_id,
            user_id = %event.user_id,
            thread = %event.thread,
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let history_pool = connect_with_settings(
        &config.history.url,
        config.history.max_connections,
        config.history.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&history_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.history_ready",
        correlation_id = "bootstrap",
        max_turns = config.history.max_turns,
        "history database connected and migrated"
    );

    let warehouse_pool = connect_warehouse(
        config.warehouse.url.expose_secret(),
        config.warehouse.max_connections,
        config.warehouse.query_timeout_secs,
    )
    .map_err(BootstrapError::Warehouse)?;

    let context = SqlPromptContext {
        schema: read_context(&config.warehouse.schema_path).await?,
        rules: read_context(&config.warehouse.rules_path).await?,
    };
    let client = build_client(&config.llm)?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        provider = client.name(),
        model = %config.llm.model,
        "text model client initialized"
    );
    let model = Arc::new(PromptedModel::new(client, &context));

    let pipeline = QueryPipeline::new(
        model.clone(),
        Arc::new(MySqlQueryExecutor::new(warehouse_pool, RetryPolicy::default())),
        PipelineSettings {
            query_timeout: config.warehouse.query_timeout(),
            max_summary_rows: config.warehouse.max_summary_rows,
        },
    );
    let nodes = RouteNodes::new(
        IntentClassifier::new(model.clone(), config.orchestrator.classifier_history_window),
        model,
        pipeline,
    );
    let history = Arc::new(HistoryStore::new(
        Arc::new(SqlHistoryRepository::new(history_pool.clone())),
        config.history.max_turns,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        history,
        nodes,
        dispatcher_for(config.orchestrator.graph_dispatch),
        Arc::new(TracingAuditSink),
        config.orchestrator.total_timeout(),
    ));
    let sender: Arc<dyn MessageSender> = Arc::new(ZulipClient::from_config(&config.zulip)?);

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        dispatcher = orchestrator.dispatcher_name(),
        "application bootstrap complete"
    );
    Ok(Application { config, history_pool, orchestrator, sender })
}

async fn read_context(path: &Path) -> Result<String, BootstrapError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BootstrapError::PromptContext { path: path.to_path_buf(), source })
}
