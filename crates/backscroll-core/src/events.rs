use crate::types::{ChatId, MessageId};

/// Inputs consumed by [`crate::controller::ChatController::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The authoritative sequence of `chat_id` may have changed in any way
    MessagesChanged { chat_id: ChatId },
    /// A message was appended to `chat_id`
    IncomingMessage {
        chat_id: ChatId,
        message_id: MessageId,
    },
    SelectChat { chat_id: ChatId },
    JumpToMessage {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// The user moved the scroll container to an absolute position
    Scrolled { scroll_top: u32 },
    ScrollBy { delta: i64 },
    Resized { client_height: u32 },
    JumpToLatest,
    Shutdown,
}
