//! Message handling for Fred.
//!
//! A run moves through `Start -> ClassifyIntent -> Route* -> Respond -> End`:
//! - `classifier` maps a message to an [`fred_core::Intent`], falling back to `Other`
//! - `guardrails` holds the SQL safety gate every generated statement passes through
//! - `pipeline` turns database questions into a guarded read-only query and a summary
//! - `runtime` owns the [`runtime::Orchestrator`] that sequences a run and records history
//!
//! The text model only ever produces text. Whether a query runs is decided by
//! the guard, never by the model.

pub mod classifier;
pub mod dispatch;
pub mod graph;
pub mod guardrails;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod runtime;

pub use classifier::{Classification, IntentClassifier};
pub use dispatch::{dispatcher_for, DirectDispatcher, GraphDispatcher, RouteDispatcher, RouteNodes};
pub use guardrails::SqlSafetyGuard;
pub use llm::{build_client, LlmClient, LlmError};
pub use model::{PromptedModel, SqlPromptContext, TextModel};
pub use pipeline::{PipelineAnswer, PipelineSettings, QueryPipeline};
pub use runtime::{Orchestrator, RunOutcome};
