//! Message store collaborator

mod memory;

pub use memory::{InMemoryStore, StoreStats};

use crate::error::Result;
use crate::types::{ChatId, ItemId, MarkerOne, Message, MessageId};
use async_trait::async_trait;

/// Source of truth for a chat's messages.
///
/// The pager never caches anything from here across a change signal: the id
/// sequence is re-fetched wholesale every time.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// The full ordered sequence, with day markers and, when `marker_one` names
    /// a message, the unread marker placed before it.
    async fn message_ids(&self, chat_id: ChatId, marker_one: &MarkerOne) -> Result<Vec<ItemId>>;

    /// Unread message ids in sequence order
    async fn unread_message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>>;

    /// Load message content. Ids that no longer exist are omitted from the result.
    async fn load_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<Message>>;

    async fn mark_messages_seen(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()>;
}
