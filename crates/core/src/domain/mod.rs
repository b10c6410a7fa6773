pub mod chat;
pub mod conversation;
pub mod failure;
pub mod intent;
pub mod query;
