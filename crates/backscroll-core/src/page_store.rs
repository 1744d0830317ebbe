//! PageStore - the loaded pages of one chat and the contiguous block they form

use crate::types::{
    ChatId, Direction, ItemId, MarkerOne, Message, MessageId, MessageRecord, PageKey,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A contiguous slice of the full id sequence with its materialized records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub key: PageKey,
    pub items: Vec<ItemId>,
    /// Aligned with `items`; `None` when the store no longer had the message
    pub records: Vec<Option<MessageRecord>>,
}

impl Page {
    pub fn new(key: PageKey, items: Vec<ItemId>, records: Vec<Option<MessageRecord>>) -> Self {
        Self {
            key,
            items,
            records,
        }
    }

    pub fn first_index(&self) -> usize {
        self.key.first_index
    }

    pub fn last_index(&self) -> usize {
        self.key.last_index
    }

    /// `(sequence index, item, record)` for every entry of the page
    pub fn entries(&self) -> impl Iterator<Item = (usize, ItemId, Option<&MessageRecord>)> + '_ {
        self.items.iter().enumerate().map(|(offset, item)| {
            (
                self.key.first_index + offset,
                *item,
                self.records.get(offset).and_then(Option::as_ref),
            )
        })
    }
}

/// The state consumed by rendering
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub chat_id: ChatId,
    pub page_ordering: Vec<PageKey>,
    pub pages: HashMap<PageKey, Page>,
    pub message_ids: Vec<ItemId>,
    pub unread_message_ids: Vec<MessageId>,
    pub marker_one: MarkerOne,
}

impl PageState {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            ..Self::default()
        }
    }

    pub fn last_page(&self) -> Option<&Page> {
        self.page_ordering.last().and_then(|key| self.pages.get(key))
    }

    /// Loaded pages in ascending order
    pub fn iter_pages(&self) -> impl Iterator<Item = &Page> + '_ {
        self.page_ordering
            .iter()
            .filter_map(|key| self.pages.get(key))
    }

    /// Inclusive index range covered by the loaded block
    pub fn loaded_range(&self) -> Option<(usize, usize)> {
        let first = self.page_ordering.first()?;
        let last = self.page_ordering.last()?;
        Some((first.first_index, last.last_index))
    }

    pub fn page_containing(&self, index: usize) -> Option<&Page> {
        self.iter_pages().find(|page| page.key.contains(index))
    }

    /// Loaded ranges are strictly ascending with no gaps between neighbours
    pub fn is_contiguous(&self) -> bool {
        self.page_ordering
            .windows(2)
            .all(|pair| pair[0].last_index + 1 == pair[1].first_index)
            && self
                .page_ordering
                .iter()
                .all(|key| key.first_index <= key.last_index && self.pages.contains_key(key))
    }

    /// Whether the newest entry of the sequence is part of the loaded block
    pub fn is_tail_loaded(&self) -> bool {
        match (self.last_page(), self.message_ids.len().checked_sub(1)) {
            (Some(page), Some(newest)) => page.key.last_index == newest,
            _ => false,
        }
    }
}

/// Inclusive range of the newest page
pub fn tail_range(len: usize, page_size: usize) -> Option<(usize, usize)> {
    let last = len.checked_sub(1)?;
    Some((len.saturating_sub(page_size.max(1)), last))
}

/// Inclusive range of a page that has `index` near its middle
pub fn range_around(index: usize, len: usize, page_size: usize) -> Option<(usize, usize)> {
    if index >= len {
        return None;
    }
    let page_size = page_size.max(1);
    let mut first = index.saturating_sub(page_size / 2);
    let last = (first + page_size - 1).min(len - 1);
    if last + 1 - first < page_size {
        first = (last + 1).saturating_sub(page_size);
    }
    Some((first, last))
}

/// A freshly fetched authoritative sequence for one chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceSnapshot {
    pub chat_id: ChatId,
    pub message_ids: Vec<ItemId>,
    pub unread_message_ids: Vec<MessageId>,
    pub marker_one: MarkerOne,
}

/// An outstanding page fetch. Carries what is needed to detect that the
/// result arrived for a chat or sequence that has since been replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub chat_id: ChatId,
    pub generation: u64,
    pub direction: Direction,
    pub key: PageKey,
    pub items: Vec<ItemId>,
}

impl LoadTicket {
    /// Real message ids that must be fetched for this page
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.items.iter().filter_map(ItemId::message_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRejection {
    /// A load in this direction is already outstanding; the request is dropped
    InFlight,
    /// The loaded block already reaches that end of the sequence
    NothingToLoad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { page: PageKey, evicted: Vec<PageKey> },
    Dropped,
    NothingToLoad,
    Stale,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

impl From<LoadRejection> for LoadOutcome {
    fn from(rejection: LoadRejection) -> Self {
        match rejection {
            LoadRejection::InFlight => LoadOutcome::Dropped,
            LoadRejection::NothingToLoad => LoadOutcome::NothingToLoad,
        }
    }
}

/// Owner of the loaded pages for the active chat.
///
/// Loading happens in two synchronous halves around the asynchronous fetch:
/// [`PageStore::begin_load`] claims the direction and computes the range,
/// [`PageStore::complete_load`] applies the result.
#[derive(Debug)]
pub struct PageStore {
    state: PageState,
    page_size: usize,
    generation: u64,
    loading_before: bool,
    loading_after: bool,
}

impl PageStore {
    pub fn new(chat_id: ChatId, page_size: usize) -> Self {
        Self {
            state: PageState::new(chat_id),
            page_size: page_size.max(1),
            generation: 0,
            loading_before: false,
            loading_after: false,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn chat_id(&self) -> ChatId {
        self.state.chat_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.loading_before || self.loading_after
    }

    pub fn is_loading_direction(&self, direction: Direction) -> bool {
        match direction {
            Direction::Before => self.loading_before,
            Direction::After => self.loading_after,
        }
    }

    pub fn can_load_page_before(&self, key: &PageKey) -> bool {
        key.chat_id == self.state.chat_id && key.first_index > 0
    }

    pub fn can_load_page_after(&self, key: &PageKey) -> bool {
        key.chat_id == self.state.chat_id && key.last_index + 1 < self.state.message_ids.len()
    }

    /// Range the next load in `direction` would cover
    pub fn next_range(&self, direction: Direction) -> Option<(usize, usize)> {
        let len = self.state.message_ids.len();
        match (direction, self.state.loaded_range()) {
            (Direction::Before, None) => tail_range(len, self.page_size),
            (Direction::After, None) => {
                let last = len.checked_sub(1)?;
                Some((0, last.min(self.page_size - 1)))
            }
            (Direction::Before, Some((first, _))) => {
                let last = first.checked_sub(1)?;
                Some((first.saturating_sub(self.page_size), last))
            }
            (Direction::After, Some((_, last))) => {
                let first = last + 1;
                if first >= len {
                    return None;
                }
                Some((first, (last + self.page_size).min(len - 1)))
            }
        }
    }

    /// Claim `direction` and describe the page to fetch
    pub fn begin_load(&mut self, direction: Direction) -> Result<LoadTicket, LoadRejection> {
        if self.is_loading_direction(direction) {
            debug!(target: "pager.store", "load {} already in flight, dropping request", direction);
            return Err(LoadRejection::InFlight);
        }

        let Some((first, last)) = self.next_range(direction) else {
            debug!(target: "pager.store", "cannot load {}: sequence edge already loaded", direction);
            return Err(LoadRejection::NothingToLoad);
        };

        match direction {
            Direction::Before => self.loading_before = true,
            Direction::After => self.loading_after = true,
        }

        let key = PageKey::new(self.state.chat_id, first, last);
        Ok(LoadTicket {
            chat_id: self.state.chat_id,
            generation: self.generation,
            direction,
            key,
            items: self.state.message_ids[first..=last].to_vec(),
        })
    }

    /// Release the direction claimed by a ticket whose fetch failed
    pub fn abort_load(&mut self, ticket: &LoadTicket) {
        if self.owns(ticket) {
            self.release(ticket.direction);
        }
    }

    /// Apply a fetched page: evict `evict` from the far end, then attach the page
    /// at the ticket's end of the block.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        messages: Vec<Message>,
        evict: &[PageKey],
    ) -> LoadOutcome {
        if !self.owns(&ticket) {
            debug!(
                target: "pager.store",
                "discarding stale {} page {} (chat {}, generation {})",
                ticket.direction, ticket.key, ticket.chat_id, ticket.generation
            );
            return LoadOutcome::Stale;
        }
        self.release(ticket.direction);

        let adjoins = match (ticket.direction, self.state.loaded_range()) {
            (_, None) => true,
            (Direction::Before, Some((first, _))) => ticket.key.last_index + 1 == first,
            (Direction::After, Some((_, last))) => last + 1 == ticket.key.first_index,
        };
        if !adjoins {
            warn!(
                target: "pager.store",
                "page {} no longer adjoins the loaded block, discarding", ticket.key
            );
            return LoadOutcome::Stale;
        }

        let evicted = self.evict_far_end(ticket.direction, evict);
        let page = self.materialize(ticket.key, ticket.items, messages);

        match ticket.direction {
            Direction::Before => self.state.page_ordering.insert(0, ticket.key),
            Direction::After => self.state.page_ordering.push(ticket.key),
        }
        self.state.pages.insert(ticket.key, page);

        debug!(
            target: "pager.store",
            "loaded page {} {} ({} evicted)", ticket.key, ticket.direction, evicted.len()
        );
        LoadOutcome::Loaded {
            page: ticket.key,
            evicted,
        }
    }

    /// Replace the sequence and drop every loaded page. Outstanding tickets become stale.
    pub fn reset(&mut self, snapshot: SequenceSnapshot) {
        self.generation += 1;
        self.loading_before = false;
        self.loading_after = false;
        self.state = PageState {
            chat_id: snapshot.chat_id,
            page_ordering: Vec::new(),
            pages: HashMap::new(),
            message_ids: snapshot.message_ids,
            unread_message_ids: snapshot.unread_message_ids,
            marker_one: snapshot.marker_one,
        };
    }

    /// Reset to `snapshot` and install the single page `range` (inclusive) of it.
    /// Returns `None`, leaving the store empty, when the range falls outside the sequence.
    pub fn replace_with_page(
        &mut self,
        snapshot: SequenceSnapshot,
        range: (usize, usize),
        messages: Vec<Message>,
    ) -> Option<PageKey> {
        self.reset(snapshot);
        let (first, last) = range;
        if first > last || last >= self.state.message_ids.len() {
            warn!(
                target: "pager.store",
                "refusing to install out-of-range page {}..={} (len {})",
                first,
                last,
                self.state.message_ids.len()
            );
            return None;
        }

        let key = PageKey::new(self.state.chat_id, first, last);
        let items = self.state.message_ids[first..=last].to_vec();
        let page = self.materialize(key, items, messages);
        self.state.page_ordering.push(key);
        self.state.pages.insert(key, page);
        Some(key)
    }

    /// Accept a sequence that only appends to the current one; loaded pages stay valid.
    /// Returns false (and changes nothing) when `message_ids` is not an extension.
    pub fn extend_sequence(&mut self, message_ids: Vec<ItemId>, unread: Vec<MessageId>) -> bool {
        let current = &self.state.message_ids;
        if message_ids.len() < current.len() || !message_ids.starts_with(current) {
            return false;
        }
        self.state.message_ids = message_ids;
        self.state.unread_message_ids = unread;
        true
    }

    /// Drop ids from the local unread set after they were reported seen
    pub fn remove_unread(&mut self, seen: &[MessageId]) {
        self.state
            .unread_message_ids
            .retain(|id| !seen.contains(id));
    }

    /// Put ids back into the unread set, keeping it in sequence order
    pub fn restore_unread(&mut self, ids: &[MessageId]) {
        let unread = &mut self.state.unread_message_ids;
        for id in ids {
            if !unread.contains(id) {
                unread.push(*id);
            }
        }
        unread.sort_unstable();
    }

    fn owns(&self, ticket: &LoadTicket) -> bool {
        ticket.chat_id == self.state.chat_id && ticket.generation == self.generation
    }

    fn release(&mut self, direction: Direction) {
        match direction {
            Direction::Before => self.loading_before = false,
            Direction::After => self.loading_after = false,
        }
    }

    /// Evicts only from the end opposite `growth`, stopping at the first key that
    /// is not currently at that end so the block never gets a hole.
    fn evict_far_end(&mut self, growth: Direction, evict: &[PageKey]) -> Vec<PageKey> {
        let mut evicted = Vec::new();
        for key in evict {
            let at_far_end = match growth {
                Direction::Before => self.state.page_ordering.last() == Some(key),
                Direction::After => self.state.page_ordering.first() == Some(key),
            };
            if !at_far_end {
                warn!(
                    target: "pager.store",
                    "page {} is not at the {} end, stopping eviction",
                    key,
                    match growth {
                        Direction::Before => "bottom",
                        Direction::After => "top",
                    }
                );
                break;
            }
            match growth {
                Direction::Before => {
                    self.state.page_ordering.pop();
                }
                Direction::After => {
                    self.state.page_ordering.remove(0);
                }
            }
            self.state.pages.remove(key);
            evicted.push(*key);
        }
        evicted
    }

    fn materialize(&self, key: PageKey, items: Vec<ItemId>, messages: Vec<Message>) -> Page {
        let mut by_id: HashMap<MessageId, Message> =
            messages.into_iter().map(|m| (m.id, m)).collect();

        let records = items
            .iter()
            .enumerate()
            .map(|(offset, item)| match item {
                ItemId::Message(id) => {
                    let record = by_id.remove(id).map(MessageRecord::Content);
                    if record.is_none() {
                        debug!(target: "pager.store", "message {} vanished before it was loaded", id);
                    }
                    record
                }
                ItemId::DayMarker { timestamp } => Some(MessageRecord::DayMarker {
                    timestamp: *timestamp,
                }),
                ItemId::UnreadMarker => Some(MessageRecord::UnreadSeparator {
                    count: self.separator_count(key.first_index + offset),
                }),
            })
            .collect();

        Page::new(key, items, records)
    }

    /// The separator shows the count recorded for the message right after it
    fn separator_count(&self, index: usize) -> usize {
        self.state
            .message_ids
            .get(index + 1)
            .and_then(ItemId::message_id)
            .and_then(|id| self.state.marker_one.get(&id).copied())
            .or_else(|| self.state.marker_one.values().next().copied())
            .unwrap_or(0)
    }
}
