//! Identifiers and records shared by every part of the pager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum::Display;

/// Identifier of a chat (one conversation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChatId(pub u32);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinal identifier of a real message within a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the full id sequence.
///
/// Day markers and the unread marker are synthesized by the store on every
/// fetch, so they have no identity beyond their position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemId {
    Message(MessageId),
    DayMarker { timestamp: i64 },
    UnreadMarker,
}

impl ItemId {
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            ItemId::Message(id) => Some(*id),
            ItemId::DayMarker { .. } | ItemId::UnreadMarker => None,
        }
    }

    /// Marker items can only be matched across refreshes when their index is unchanged
    pub fn is_marker(&self) -> bool {
        !matches!(self, ItemId::Message(_))
    }
}

impl From<MessageId> for ItemId {
    fn from(id: MessageId) -> Self {
        ItemId::Message(id)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Message(id) => write!(f, "msg:{id}"),
            ItemId::DayMarker { timestamp } => write!(f, "day:{timestamp}"),
            ItemId::UnreadMarker => write!(f, "unread-marker"),
        }
    }
}

/// Unread separator placement: the message it precedes and the unread count it shows
pub type MarkerOne = BTreeMap<MessageId, usize>;

/// Build a fresh marker placement from the store's unread ids
pub fn marker_one_for(unread: &[MessageId]) -> MarkerOne {
    let mut marker = MarkerOne::new();
    if let Some(first) = unread.first() {
        marker.insert(*first, unread.len());
    }
    marker
}

/// An ordinary chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: String,
    pub text: String,
    /// Unix seconds
    pub timestamp: i64,
    pub is_outgoing: bool,
}

/// Materialized content of one sequence entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRecord {
    Content(Message),
    DayMarker { timestamp: i64 },
    UnreadSeparator { count: usize },
}

/// Which end of the loaded block a page is added to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Direction {
    Before,
    After,
}

/// Structured page identity: a contiguous index range of one chat's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub chat_id: ChatId,
    pub first_index: usize,
    pub last_index: usize,
}

impl PageKey {
    pub fn new(chat_id: ChatId, first_index: usize, last_index: usize) -> Self {
        Self {
            chat_id,
            first_index,
            last_index,
        }
    }

    pub fn item_count(&self) -> usize {
        self.last_index - self.first_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.first_index..=self.last_index).contains(&index)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page-{}-{}-{}",
            self.chat_id, self.first_index, self.last_index
        )
    }
}

/// Structured identity of one rendered element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub page: PageKey,
    pub item: ItemId,
    pub index: usize,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.page, self.item, self.index)
    }
}

/// Scroll position expressed relative to a message, captured before a mutation
/// and consumed by the render that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportAnchor {
    pub item: ItemId,
    pub index: usize,
    /// `scroll_top - element_top` at capture time
    pub offset: i64,
}
