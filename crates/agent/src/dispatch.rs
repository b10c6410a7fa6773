use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use fred_core::{ConversationHistory, FailureReason, Intent};

use crate::classifier::IntentClassifier;
use crate::graph::{transition, RunEvent, RunState};
use crate::model::TextModel;
use crate::pipeline::QueryPipeline;
use crate::prompts::CAPABILITY_MESSAGE;

pub const CHATBOT_APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again shortly.";

/// Text produced by one route, plus why it degraded if it did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteAnswer {
    pub text: String,
    pub failure: Option<FailureReason>,
}

/// Outcome of classification plus the chosen route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    pub intent: Intent,
    pub text: String,
    pub failures: Vec<FailureReason>,
}

/// The node functions both dispatchers are built from.
pub struct RouteNodes {
    classifier: IntentClassifier,
    model: Arc<dyn TextModel>,
    pipeline: QueryPipeline,
}

impl RouteNodes {
    pub fn new(classifier: IntentClassifier, model: Arc<dyn TextModel>, pipeline: QueryPipeline) -> Self {
        Self { classifier, model, pipeline }
    }

    pub async fn route_chatbot(&self, text: &str, history: &ConversationHistory) -> RouteAnswer {
        match self.model.converse(text, history).await {
            Ok(reply) => RouteAnswer { text: reply, failure: None },
            Err(error) => {
                warn!(event_name = "agent.route.chatbot_failed", error = %error, "chatbot reply failed");
                RouteAnswer {
                    text: CHATBOT_APOLOGY.to_owned(),
                    failure: Some(FailureReason::ChatbotFailed),
                }
            }
        }
    }

    /// Fixed capability notice; touches neither the model nor the database.
    pub fn route_other(&self) -> RouteAnswer {
        RouteAnswer { text: CAPABILITY_MESSAGE.to_owned(), failure: None }
    }

    pub async fn route_database(&self, text: &str, history: &ConversationHistory) -> RouteAnswer {
        let answer = self.pipeline.answer(text, history).await;
        RouteAnswer { text: answer.text, failure: answer.failure }
    }

    async fn route(&self, intent: Intent, text: &str, history: &ConversationHistory) -> RouteAnswer {
        match intent {
            Intent::Chatbot => self.route_chatbot(text, history).await,
            Intent::Other => self.route_other(),
            Intent::Database => self.route_database(text, history).await,
        }
    }
}

/// Selects and runs the branch for one message. Implementations must be
/// observably identical; they differ only in how control flows internally.
#[async_trait]
pub trait RouteDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(
        &self,
        nodes: &RouteNodes,
        text: &str,
        history: &ConversationHistory,
    ) -> Routed;
}

/// Picks the dispatcher named by the `orchestrator.graph_dispatch` switch.
pub fn dispatcher_for(graph_dispatch: bool) -> Arc<dyn RouteDispatcher> {
    if graph_dispatch {
        Arc::new(GraphDispatcher)
    } else {
        Arc::new(DirectDispatcher)
    }
}

/// Single function call: classify, then match on the intent.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectDispatcher;

#[async_trait]
impl RouteDispatcher for DirectDispatcher {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn dispatch(
        &self,
        nodes: &RouteNodes,
        text: &str,
        history: &ConversationHistory,
    ) -> Routed {
        let classification = nodes.classifier.classify_detailed(text, history).await;
        let answer = nodes.route(classification.intent, text, history).await;

        Routed {
            intent: classification.intent,
            text: answer.text,
            failures: classification.failure.into_iter().chain(answer.failure).collect(),
        }
    }
}

/// Walks the run graph node by node, following the transition table from
/// `ClassifyIntent` until it reaches `Respond`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphDispatcher;

#[async_trait]
impl RouteDispatcher for GraphDispatcher {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn dispatch(
        &self,
        nodes: &RouteNodes,
        text: &str,
        history: &ConversationHistory,
    ) -> Routed {
        let mut state = RunState::ClassifyIntent;
        let mut intent = Intent::Other;
        let mut failures = Vec::new();
        let mut reply: Option<String> = None;

        while state != RunState::Respond {
            debug!(event_name = "agent.graph.node_entered", node = %state, "graph node entered");

            let event = match state {
                RunState::ClassifyIntent => {
                    let classification = nodes.classifier.classify_detailed(text, history).await;
                    intent = classification.intent;
                    failures.extend(classification.failure);
                    RunEvent::Classified(intent)
                }
                RunState::RouteChatbot | RunState::RouteOther | RunState::RouteDatabase => {
                    let answer = match state {
                        RunState::RouteChatbot => nodes.route_chatbot(text, history).await,
                        RunState::RouteDatabase => nodes.route_database(text, history).await,
                        _ => nodes.route_other(),
                    };
                    failures.extend(answer.failure);
                    reply = Some(answer.text);
                    RunEvent::Answered
                }
                RunState::Start | RunState::Respond | RunState::End => RunEvent::Abandoned,
            };

            state = match transition(state, event) {
                Ok(next) => next,
                Err(transition_error) => {
                    error!(
                        event_name = "agent.graph.invalid_transition",
                        error = %transition_error,
                        "graph left its transition table"
                    );
                    break;
                }
            };
        }

        Routed {
            intent,
            text: reply.unwrap_or_else(|| nodes.route_other().text),
            failures,
        }
    }
}
