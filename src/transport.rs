//! Outbound messaging capability
//!
//! Send and delete return explicit results; broadcast callers decide per
//! recipient whether a failure matters (it never aborts the loop).

use crate::error::Result;
use crate::{ChatId, MessageId};
use async_trait::async_trait;

/// A message received from a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub text: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Send an HTML-formatted message, returning its id.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;
}
