use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use fred_agent::Orchestrator;
use fred_core::ChatRequest;
use fred_zulip::MessageSender;

/// Runs chat requests in the background and delivers what they produce.
/// Every spawned run is tracked so shutdown can drain or cancel it.
#[derive(Clone)]
pub struct ChatWorker {
    orchestrator: Arc<Orchestrator>,
    sender: Arc<dyn MessageSender>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ChatWorker {
    pub fn new(orchestrator: Arc<Orchestrator>, sender: Arc<dyn MessageSender>) -> Self {
        Self { orchestrator, sender, tracker: TaskTracker::new(), cancel: CancellationToken::new() }
    }

    pub fn sender(&self) -> Arc<dyn MessageSender> {
        Arc::clone(&self.sender)
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn(&self, request: ChatRequest) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let sender = Arc::clone(&self.sender);
        let cancel = self.cancel.child_token();

        self.tracker.spawn(async move {
            let outcome = orchestrator.run(&request, &cancel).await;
            for effect in &outcome.effects {
                // Delivery is not idempotent; a failed send is logged, never retried.
                if let Err(error) = sender.perform(effect).await {
                    warn!(
                        event_name = "server.worker.delivery_failed",
                        correlation_id = %outcome.correlation_id,
                        user_id = %request.user_id,
                        error = %error,
                        "reply delivery failed"
                    );
                }
            }
        });
    }

    /// Stops accepting work, waits up to `grace` for in-flight runs, then
    /// cancels whatever is left. Cancelled runs write no history.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        let pending = self.tracker.len();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                event_name = "server.worker.cancelling",
                pending = self.tracker.len(),
                "grace period elapsed; cancelling in-flight runs"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        info!(event_name = "server.worker.drained", drained = pending, "chat worker stopped");
    }
}
