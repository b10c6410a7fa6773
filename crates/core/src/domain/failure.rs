use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::query::RejectReason;

/// Why a run degraded. Recorded in logs and audit events, never shown to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    ClassificationFailed,
    SqlRejected(RejectReason),
    GenerationFailed,
    ExecutionFailed,
    ExecutionTimeout,
    SummarizationFailed,
    ChatbotFailed,
    HistoryReadFailed,
    HistoryWriteFailed,
    Cancelled,
    TimedOut,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassificationFailed => "classification_failed",
            Self::SqlRejected(_) => "sql_rejected",
            Self::GenerationFailed => "generation_failed",
            Self::ExecutionFailed => "execution_failed",
            Self::ExecutionTimeout => "execution_timeout",
            Self::SummarizationFailed => "summarization_failed",
            Self::ChatbotFailed => "chatbot_failed",
            Self::HistoryReadFailed => "history_read_failed",
            Self::HistoryWriteFailed => "history_write_failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SqlRejected(reason) => write!(f, "sql_rejected({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}
