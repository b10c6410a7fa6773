//! Fred Core - domain types, configuration, and error taxonomy
//!
//! Shared by every other crate in the workspace. Nothing in here talks to the
//! network or a database; configuration loading reads files and the environment.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod retry;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::chat::{
    ChatRequest, ChatResponse, DeliveryTarget, SideEffect, ThreadContext, UserId,
};
pub use domain::conversation::{ConversationHistory, ConversationTurn, Role};
pub use domain::failure::FailureReason;
pub use domain::intent::Intent;
pub use domain::query::{
    QueryResult, QueryRow, RejectReason, SqlCandidate, SqlValidationResult, SqlVerdict,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use retry::RetryPolicy;
