use super::MessageStore;
use crate::error::{Error, Result};
use crate::events::ChatEvent;
use crate::types::{ChatId, ItemId, MarkerOne, Message, MessageId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

const SEED_SPACING_SECS: i64 = 3 * 60 * 60;
const INCOMING_SPACING_SECS: i64 = 60;

#[derive(Debug, Default)]
struct ChatLog {
    messages: Vec<Message>,
    unread: Vec<MessageId>,
}

#[derive(Debug, Default)]
struct Counters {
    id_fetches: AtomicUsize,
    loads: AtomicUsize,
    seen_calls: AtomicUsize,
    seen_ids: AtomicUsize,
}

/// Call counts observed by an [`InMemoryStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub id_fetches: usize,
    pub loads: usize,
    pub seen_calls: usize,
    pub seen_ids: usize,
}

/// Message store kept entirely in memory, shared between clones.
///
/// With an event sender attached, every mutation is announced the way a real
/// backend would: appends as `IncomingMessage`, everything else as `MessagesChanged`.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    chats: Arc<RwLock<HashMap<ChatId, ChatLog>>>,
    next_id: Arc<AtomicU32>,
    counters: Arc<Counters>,
    events: Option<mpsc::Sender<ChatEvent>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn day_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|at| at.date_naive())
}

fn day_start(day: NaiveDate) -> Option<i64> {
    day.and_hms_opt(0, 0, 0).map(|at| at.and_utc().timestamp())
}

fn seed_text(i: usize) -> String {
    let words = ["hello", "are we still on for tomorrow", "sure", "sounds good, see you then"];
    words[i % words.len()].repeat(1 + i % 3)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chats: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU32::new(1)),
            counters: Arc::new(Counters::default()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Never blocks: a full or closed channel drops the notification
    fn announce(&self, event: ChatEvent) {
        if let Some(events) = &self.events
            && let Err(e) = events.try_send(event)
        {
            warn!(target: "pager.store", "Dropping store notification: {}", e);
        }
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Create `chat_id` with `count` messages, three hours apart starting at
    /// `start_timestamp`; the newest `unread` of them are unread.
    pub async fn seed_chat(
        &self,
        chat_id: ChatId,
        count: usize,
        unread: usize,
        start_timestamp: i64,
    ) -> Vec<MessageId> {
        let mut log = ChatLog::default();
        let mut timestamp = start_timestamp;
        for i in 0..count {
            let id = self.allocate_id();
            log.messages.push(Message {
                id,
                author: (if i % 2 == 0 { "alice" } else { "bob" }).to_string(),
                text: seed_text(i),
                timestamp,
                is_outgoing: i % 2 == 1,
            });
            timestamp += SEED_SPACING_SECS;
        }
        log.unread = log
            .messages
            .iter()
            .skip(count.saturating_sub(unread))
            .map(|m| m.id)
            .collect();

        let ids = log.messages.iter().map(|m| m.id).collect();
        self.chats.write().await.insert(chat_id, log);
        ids
    }

    /// Append a message. Incoming messages start out unread.
    pub async fn push_message(
        &self,
        chat_id: ChatId,
        author: &str,
        text: &str,
        is_outgoing: bool,
    ) -> Result<MessageId> {
        let mut chats = self.chats.write().await;
        let log = chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;

        let id = self.allocate_id();
        let timestamp = log
            .messages
            .last()
            .map_or(0, |m| m.timestamp + INCOMING_SPACING_SECS);
        log.messages.push(Message {
            id,
            author: author.to_string(),
            text: text.to_string(),
            timestamp,
            is_outgoing,
        });
        if !is_outgoing {
            log.unread.push(id);
        }
        drop(chats);

        self.announce(ChatEvent::IncomingMessage {
            chat_id,
            message_id: id,
        });
        Ok(id)
    }

    /// Delete messages; unknown ids are ignored
    pub async fn remove_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<usize> {
        let mut chats = self.chats.write().await;
        let log = chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;

        let before = log.messages.len();
        log.messages.retain(|m| !ids.contains(&m.id));
        log.unread.retain(|id| !ids.contains(id));
        let removed = before - log.messages.len();
        drop(chats);

        if removed > 0 {
            self.announce(ChatEvent::MessagesChanged { chat_id });
        }
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            id_fetches: self.counters.id_fetches.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            seen_calls: self.counters.seen_calls.load(Ordering::Relaxed),
            seen_ids: self.counters.seen_ids.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn message_ids(&self, chat_id: ChatId, marker_one: &MarkerOne) -> Result<Vec<ItemId>> {
        self.counters.id_fetches.fetch_add(1, Ordering::Relaxed);
        let chats = self.chats.read().await;
        let log = chats
            .get(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;

        let mut sequence = Vec::with_capacity(log.messages.len() + log.messages.len() / 4 + 1);
        let mut current_day = None;
        for message in &log.messages {
            let day = day_of(message.timestamp);
            if day != current_day {
                if let Some(timestamp) = day.and_then(day_start) {
                    sequence.push(ItemId::DayMarker { timestamp });
                }
                current_day = day;
            }
            if marker_one.contains_key(&message.id) {
                sequence.push(ItemId::UnreadMarker);
            }
            sequence.push(ItemId::Message(message.id));
        }
        Ok(sequence)
    }

    async fn unread_message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>> {
        let chats = self.chats.read().await;
        chats
            .get(&chat_id)
            .map(|log| log.unread.clone())
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))
    }

    async fn load_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        let chats = self.chats.read().await;
        let log = chats
            .get(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;

        Ok(log
            .messages
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn mark_messages_seen(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()> {
        self.counters.seen_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.seen_ids.fetch_add(ids.len(), Ordering::Relaxed);
        let mut chats = self.chats.write().await;
        let log = chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;
        log.unread.retain(|id| !ids.contains(id));
        drop(chats);

        self.announce(ChatEvent::MessagesChanged { chat_id });
        Ok(())
    }
}
