//! Store wrappers for exercising the pager's concurrency and failure paths

use crate::error::{Error, Result};
use crate::store::MessageStore;
use crate::types::{ChatId, ItemId, MarkerOne, Message, MessageId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Wraps a store so tests can hold page loads open, count them and make loads
/// or read receipts fail.
#[derive(Debug)]
pub struct GatedStore<S> {
    inner: S,
    gate_closed: AtomicBool,
    fail_loads: AtomicBool,
    fail_seen: AtomicBool,
    load_calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl<S: MessageStore> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gate_closed: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            fail_seen: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Subsequent `load_messages` calls wait until [`GatedStore::open_gate`]
    pub fn close_gate(&self) {
        self.gate_closed.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gate_closed.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Resolves once a load is parked at the closed gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_seen(&self, fail: bool) {
        self.fail_seen.store(fail, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: MessageStore> MessageStore for GatedStore<S> {
    async fn message_ids(&self, chat_id: ChatId, marker_one: &MarkerOne) -> Result<Vec<ItemId>> {
        self.inner.message_ids(chat_id, marker_one).await
    }

    async fn unread_message_ids(&self, chat_id: ChatId) -> Result<Vec<MessageId>> {
        self.inner.unread_message_ids(chat_id).await
    }

    async fn load_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.gate_closed.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(Error::Store("injected load failure".to_string()));
        }
        self.inner.load_messages(chat_id, ids).await
    }

    async fn mark_messages_seen(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()> {
        if self.fail_seen.load(Ordering::SeqCst) {
            return Err(Error::Store("injected read receipt failure".to_string()));
        }
        self.inner.mark_messages_seen(chat_id, ids).await
    }
}
