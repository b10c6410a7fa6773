use std::sync::Arc;

use tracing::{info, warn};

use fred_core::{ConversationHistory, FailureReason, Intent};

use crate::model::TextModel;

/// Result of one classification; `failure` is set when the intent is a fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub failure: Option<FailureReason>,
}

pub struct IntentClassifier {
    model: Arc<dyn TextModel>,
    history_window: usize,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn TextModel>, history_window: usize) -> Self {
        Self { model, history_window }
    }

    /// Never fails. Adapter errors and unrecognised labels resolve to `Other`.
    pub async fn classify(&self, text: &str, recent_history: &ConversationHistory) -> Intent {
        self.classify_detailed(text, recent_history).await.intent
    }

    pub async fn classify_detailed(
        &self,
        text: &str,
        recent_history: &ConversationHistory,
    ) -> Classification {
        let window = recent_history.window(self.history_window);

        match self.model.classify(text, &window).await {
            Ok(label) => match Intent::from_label(&label) {
                Some(intent) => {
                    info!(event_name = "agent.classifier.classified", intent = %intent, "intent classified");
                    Classification { intent, failure: None }
                }
                None => {
                    warn!(
                        event_name = "agent.classifier.unrecognized_label",
                        label = %label.chars().take(64).collect::<String>(),
                        "model label did not match a known intent"
                    );
                    Classification {
                        intent: Intent::Other,
                        failure: Some(FailureReason::ClassificationFailed),
                    }
                }
            },
            Err(error) => {
                warn!(event_name = "agent.classifier.model_failed", error = %error, "classification call failed");
                Classification {
                    intent: Intent::Other,
                    failure: Some(FailureReason::ClassificationFailed),
                }
            }
        }
    }
}
