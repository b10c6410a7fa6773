//! Zulip integration for Fred.
//!
//! - `payload` - outgoing-webhook payloads Zulip posts to `/chat`, and their
//!   conversion into a [`fred_core::ChatRequest`]
//! - `sender` - the [`sender::MessageSender`] seam replies go through
//! - `client` - REST client for `POST /api/v1/messages`

pub mod client;
pub mod payload;
pub mod sender;

pub use client::ZulipClient;
pub use payload::{MessageType, PayloadError, WebhookPayload, ZulipMessage};
pub use sender::{DeliveryError, MessageSender, RecordingSender, SentMessage};
