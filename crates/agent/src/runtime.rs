use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use fred_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use fred_core::{
    ChatRequest, ChatResponse, ConversationHistory, ConversationTurn, FailureReason, Intent,
    SideEffect,
};
use fred_db::HistoryStore;

use crate::dispatch::{RouteDispatcher, RouteNodes, Routed};
use crate::graph::{transition, RunEvent, RunState};

pub const TIMED_OUT_APOLOGY: &str =
    "Sorry, that took longer than expected. Please try asking again.";
pub const CANCELLED_NOTICE: &str = "The request was cancelled before an answer was ready.";

/// Least time the history write is given, so a run that used up its budget can
/// still record the turn.
pub const HISTORY_WRITE_FLOOR: Duration = Duration::from_secs(2);

/// Everything one run produced. The caller performs `effects`; nothing in the
/// run delivers messages itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub correlation_id: String,
    pub response: ChatResponse,
    pub intent: Option<Intent>,
    pub failures: Vec<FailureReason>,
    pub effects: Vec<SideEffect>,
    pub history_written: bool,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.failures.contains(&FailureReason::Cancelled)
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Runs one chat request through history, classification, routing and the
/// history update. Every run ends with exactly one response.
pub struct Orchestrator {
    history: Arc<HistoryStore>,
    nodes: RouteNodes,
    dispatcher: Arc<dyn RouteDispatcher>,
    audit: Arc<dyn AuditSink>,
    total_timeout: Duration,
    history_write_floor: Duration,
}

impl Orchestrator {
    pub fn new(
        history: Arc<HistoryStore>,
        nodes: RouteNodes,
        dispatcher: Arc<dyn RouteDispatcher>,
        audit: Arc<dyn AuditSink>,
        total_timeout: Duration,
    ) -> Self {
        Self {
            history,
            nodes,
            dispatcher,
            audit,
            total_timeout,
            history_write_floor: HISTORY_WRITE_FLOOR,
        }
    }

    pub fn with_history_write_floor(mut self, floor: Duration) -> Self {
        self.history_write_floor = floor;
        self
    }

    pub fn dispatcher_name(&self) -> &'static str {
        self.dispatcher.name()
    }

    pub async fn run(&self, request: &ChatRequest, cancel: &CancellationToken) -> RunOutcome {
        let span = info_span!(
            "chat_run",
            correlation_id = %request.correlation_id,
            user_id = %request.user_id,
            dispatcher = self.dispatcher.name(),
        );
        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner(&self, request: &ChatRequest, cancel: &CancellationToken) -> RunOutcome {
        let received_at = Utc::now();
        let deadline = Instant::now() + self.total_timeout;
        info!(
            event_name = "agent.orchestrator.run_started",
            correlation_id = %request.correlation_id,
            user_id = %request.user_id,
            text = %request.text,
            "chat run started"
        );

        let work = async {
            enter(RunState::Start);
            let (history, read_failure) = self.load_history(request).await;
            advance(RunState::Start, RunEvent::HistoryLoaded);
            let mut routed = self.dispatcher.dispatch(&self.nodes, &request.text, &history).await;
            routed.failures.splice(0..0, read_failure);
            routed
        };

        let routed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abandon(request),
            result = tokio::time::timeout(self.total_timeout, work) => match result {
                Ok(routed) => Some(routed),
                Err(_) => None,
            },
        };

        if cancel.is_cancelled() {
            return self.abandon(request);
        }

        let (intent, text, mut failures) = match routed {
            Some(Routed { intent, text, failures }) => (Some(intent), text, failures),
            None => {
                warn!(
                    event_name = "agent.orchestrator.timed_out",
                    correlation_id = %request.correlation_id,
                    timeout_ms = self.total_timeout.as_millis() as u64,
                    "run exceeded its total time budget"
                );
                (None, TIMED_OUT_APOLOGY.to_owned(), vec![FailureReason::TimedOut])
            }
        };

        enter(RunState::Respond);
        let mut user_turn = ConversationTurn::user(request.text.clone(), intent);
        user_turn.timestamp = received_at;
        let assistant_turn = ConversationTurn::assistant(text.clone(), intent);

        // The write gets what is left of the run budget, never less than the floor.
        let write_budget =
            deadline.saturating_duration_since(Instant::now()).max(self.history_write_floor);
        let write = self.history.append_all(&request.user_id, vec![user_turn, assistant_turn]);
        let write_result = match tokio::time::timeout(write_budget, write).await {
            Ok(result) => result.map_err(|error| error.to_string()),
            Err(_) => Err(format!("history write exceeded {write_budget:?}")),
        };

        let history_written = match write_result {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        event_name = "agent.orchestrator.history_write_failed",
                        correlation_id = %request.correlation_id,
                        user_id = %request.user_id,
                        error = %error,
                        "history write failed; replying anyway"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            &audit_context(request),
                            "history.append_failed",
                            AuditCategory::History,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error", error),
                    );
                    failures.push(FailureReason::HistoryWriteFailed);
                    false
                }
            };
        advance(RunState::Respond, RunEvent::HistoryRecorded);

        let response = ChatResponse { text, delivery_target: request.delivery_target() };
        let outcome = RunOutcome {
            correlation_id: request.correlation_id.clone(),
            effects: vec![response.delivery()],
            response,
            intent,
            failures,
            history_written,
        };
        self.finish(request, &outcome);
        outcome
    }

    async fn load_history(
        &self,
        request: &ChatRequest,
    ) -> (ConversationHistory, Option<FailureReason>) {
        match self.history.get(&request.user_id).await {
            Ok(history) => (history, None),
            Err(error) => {
                warn!(
                    event_name = "agent.orchestrator.history_read_failed",
                    correlation_id = %request.correlation_id,
                    user_id = %request.user_id,
                    error = %error,
                    "history read failed; continuing without context"
                );
                (ConversationHistory::empty(), Some(FailureReason::HistoryReadFailed))
            }
        }
    }

    fn abandon(&self, request: &ChatRequest) -> RunOutcome {
        info!(
            event_name = "agent.orchestrator.cancelled",
            correlation_id = %request.correlation_id,
            user_id = %request.user_id,
            "run cancelled; history left untouched"
        );
        let outcome = RunOutcome {
            correlation_id: request.correlation_id.clone(),
            response: ChatResponse {
                text: CANCELLED_NOTICE.to_owned(),
                delivery_target: request.delivery_target(),
            },
            intent: None,
            failures: vec![FailureReason::Cancelled],
            effects: Vec::new(),
            history_written: false,
        };
        self.finish(request, &outcome);
        outcome
    }

    fn finish(&self, request: &ChatRequest, outcome: &RunOutcome) {
        let audit_outcome = if outcome.is_cancelled() {
            AuditOutcome::Failed
        } else if outcome.is_degraded() {
            AuditOutcome::Degraded
        } else {
            AuditOutcome::Success
        };
        let failures =
            outcome.failures.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let intent = outcome.intent.map(|intent| intent.as_str()).unwrap_or("unknown");

        info!(
            event_name = "agent.orchestrator.run_completed",
            correlation_id = %request.correlation_id,
            user_id = %request.user_id,
            intent,
            failures = %failures,
            history_written = outcome.history_written,
            "chat run completed"
        );
        self.audit.emit(
            AuditEvent::new(
                &audit_context(request),
                "orchestrator.run_completed",
                AuditCategory::Orchestration,
                audit_outcome,
            )
            .with_metadata("dispatcher", self.dispatcher.name())
            .with_metadata("intent", intent)
            .with_metadata("failures", failures),
        );
        if !outcome.is_cancelled() {
            enter(RunState::End);
        }
    }
}

fn audit_context(request: &ChatRequest) -> AuditContext {
    AuditContext::new(request.correlation_id.clone(), request.user_id.clone(), request.thread.label())
}

fn enter(state: RunState) {
    debug!(event_name = "agent.orchestrator.state_entered", state = %state, "state entered");
}

fn advance(state: RunState, event: RunEvent) {
    if let Err(error) = transition(state, event) {
        warn!(event_name = "agent.orchestrator.invalid_transition", error = %error, "unexpected transition");
    }
}
