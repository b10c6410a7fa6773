use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use fred_core::InterfaceError;
use fred_zulip::{MessageSender, WebhookPayload};

use crate::worker::ChatWorker;

#[derive(Clone)]
pub struct ChatState {
    pub webhook_token: SecretString,
    pub acknowledgement: String,
    pub worker: ChatWorker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub response_not_required: bool,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "detail": self.0.user_message(),
            "correlation_id": self.0.correlation_id(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/healthz", get(healthz))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready() -> Json<serde_json::Value> {
    Json(json!({ "status": "ready" }))
}

/// Authenticates the webhook, acknowledges it in the conversation, and hands
/// the question to the background worker. The answer arrives later as a
/// separate message.
pub async fn chat(
    State(state): State<ChatState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<Accepted>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    if let Err(rejection) = payload.authenticate(&state.webhook_token, &correlation_id) {
        warn!(
            event_name = "server.chat.unauthorized",
            correlation_id = %correlation_id,
            sender = %payload.message.sender_email,
            "webhook token mismatch"
        );
        return Err(ApiError(rejection));
    }

    let mut request = payload.to_chat_request().map_err(|error| {
        ApiError(InterfaceError::BadRequest {
            message: error.to_string(),
            correlation_id: correlation_id.clone(),
        })
    })?;
    request.correlation_id = correlation_id.clone();

    info!(
        event_name = "server.chat.received",
        correlation_id = %correlation_id,
        user_id = %request.user_id,
        thread = %request.thread.label(),
        "chat webhook accepted"
    );

    if !state.acknowledgement.is_empty() {
        let sender = state.worker.sender();
        if let Err(error) =
            sender.send(&request.user_id, &request.thread, &state.acknowledgement).await
        {
            error!(
                event_name = "server.chat.acknowledgement_failed",
                correlation_id = %correlation_id,
                error = %error,
                "could not acknowledge message"
            );
            return Err(ApiError(InterfaceError::Internal {
                message: format!("acknowledgement failed: {error}"),
                correlation_id,
            }));
        }
    }

    state.worker.spawn(request);
    Ok(Json(Accepted { response_not_required: true }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use fred_agent::llm::LlmError;
    use fred_agent::pipeline::PipelineSettings;
    use fred_agent::prompts::CAPABILITY_MESSAGE;
    use fred_agent::{
        dispatcher_for, IntentClassifier, Orchestrator, QueryPipeline, RouteNodes, TextModel,
    };
    use fred_core::audit::NoopAuditSink;
    use fred_core::{ConversationHistory, QueryResult, SqlCandidate, ThreadContext, UserId};
    use fred_db::{HistoryStore, InMemoryHistoryRepository, QueryError, QueryExecutor};
    use fred_zulip::RecordingSender;

    use super::{router, ChatState};
    use crate::worker::ChatWorker;

    struct OtherModel;

    #[async_trait]
    impl TextModel for OtherModel {
        async fn classify(&self, _: &str, _: &ConversationHistory) -> Result<String, LlmError> {
            Ok("other".to_owned())
        }

        async fn generate_sql(
            &self,
            _: &str,
            _: &ConversationHistory,
        ) -> Result<SqlCandidate, LlmError> {
            Err(LlmError::EmptyResponse)
        }

        async fn summarize(&self, _: &str, _: &QueryResult, _: usize) -> Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }

        async fn converse(&self, _: &str, _: &ConversationHistory) -> Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    struct NoWarehouse;

    #[async_trait]
    impl QueryExecutor for NoWarehouse {
        async fn run_select(&self, _: &str, timeout: Duration) -> Result<QueryResult, QueryError> {
            Err(QueryError::Timeout(timeout))
        }
    }

    fn state(sender: RecordingSender) -> (ChatState, Arc<HistoryStore>) {
        let model = Arc::new(OtherModel);
        let history = Arc::new(HistoryStore::new(Arc::new(InMemoryHistoryRepository::default()), 20));
        let settings =
            PipelineSettings { query_timeout: Duration::from_secs(1), max_summary_rows: 10 };
        let nodes = RouteNodes::new(
            IntentClassifier::new(model.clone(), 6),
            model.clone(),
            QueryPipeline::new(model, Arc::new(NoWarehouse), settings),
        );
        let orchestrator = Orchestrator::new(
            history.clone(),
            nodes,
            dispatcher_for(true),
            Arc::new(NoopAuditSink),
            Duration::from_secs(5),
        );
        let worker = ChatWorker::new(Arc::new(orchestrator), Arc::new(sender));
        let state = ChatState {
            webhook_token: SecretString::from("hook-secret".to_owned()),
            acknowledgement: "One moment, generating response...".to_owned(),
            worker,
        };
        (state, history)
    }

    fn chat_request(token: &str) -> Request<Body> {
        let payload = json!({
            "message": {
                "content": "Book me a flight",
                "display_recipient": "data",
                "sender_email": "ana@example.org",
                "subject": "travel",
                "type": "stream"
            },
            "token": token
        });
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request should build")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn chat_acknowledges_then_delivers_the_answer() {
        let sender = RecordingSender::default();
        let (state, history) = state(sender.clone());
        let worker = state.worker.clone();

        let response = router(state).oneshot(chat_request("hook-secret")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "response_not_required": true }));

        worker.shutdown(Duration::from_secs(5)).await;

        let sent = sender.sent();
        let thread = ThreadContext::Stream { stream: "data".to_owned(), topic: "travel".to_owned() };
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "One moment, generating response...");
        assert_eq!(sent[1].text, CAPABILITY_MESSAGE);
        assert!(sent.iter().all(|message| message.thread == thread));

        let recorded =
            history.get(&UserId("ana@example.org".to_owned())).await.expect("history");
        assert_eq!(recorded.len(), 2);
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized_and_starts_nothing() {
        let sender = RecordingSender::default();
        let (state, _history) = state(sender.clone());
        let worker = state.worker.clone();

        let response = router(state).oneshot(chat_request("guess")).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "Unauthorized Request");
        assert_eq!(worker.in_flight(), 0);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_acknowledgement_is_a_server_error() {
        let (state, history) = state(RecordingSender::failing());
        let worker = state.worker.clone();

        let response = router(state).oneshot(chat_request("hook-secret")).await.expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(worker.in_flight(), 0);
        let recorded =
            history.get(&UserId("ana@example.org".to_owned())).await.expect("history");
        assert!(recorded.is_empty());
    }

    #[tokio::test]
    async fn liveness_and_readiness_answer_without_dependencies() {
        let (state, _history) = state(RecordingSender::default());
        let app = router(state);

        for (uri, status) in [("/healthz", "ok"), ("/ready", "ready")] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({ "status": status }));
        }
    }
}
