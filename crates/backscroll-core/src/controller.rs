//! Per-chat controller: owns the page store, the render surface and the
//! counters guarding reconciliation, and drives them from chat events.

use crate::config::PagerConfig;
use crate::error::{Error, Result};
use crate::events::ChatEvent;
use crate::follow_up::{FollowUp, apply_follow_up};
use crate::geometry::{ScrollMetrics, is_one_viewport_or_more_from_newest, messages_in_view};
use crate::page_store::{LoadOutcome, PageState, PageStore, SequenceSnapshot, range_around, tail_range};
use crate::policy::{LoadRequest, plan_bottom_load, plan_tail_append, plan_top_load};
use crate::reconcile::{ReconcilePlan, VisibleItem, plan_reconciliation};
use crate::store::MessageStore;
use crate::surface::RenderSurface;
use crate::types::{ChatId, Direction, ItemId, MarkerOne, MessageId, PageKey, marker_one_for};
use crate::unread::UnreadTracker;
use crate::visibility::{IntersectionConfig, Sentinel, VisibilityObserver};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Upper bound on sentinel-triggered loads per scroll event
const MAX_SENTINEL_ROUNDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherChat,
    /// A change we caused ourselves, such as marking messages seen
    SelfInduced,
    /// Another reconciliation is already dispatched
    Busy,
    /// The chat was reselected while the fetch was outstanding
    Stale,
}

/// What a change signal ended up doing to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Ignored(IgnoreReason),
    /// The view was at the bottom, so the newest page was reselected
    FollowedTail,
    /// A visible item survived and was kept at its pixel offset
    Refreshed { item: ItemId, index: usize },
    /// Nothing visible survived; jumped to the nearest survivor
    Jumped { item: ItemId, index: usize },
    Reselected,
    /// Incoming message appended below a loaded tail
    AppendedTail,
}

/// Point-in-time summary of the view, for display and assertions
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub chat_id: ChatId,
    pub total_items: usize,
    pub loaded_range: Option<(usize, usize)>,
    pub page_count: usize,
    pub metrics: ScrollMetrics,
    pub visible: Vec<ItemId>,
    pub unread_count: usize,
    pub jump_to_latest_visible: bool,
}

#[derive(Debug)]
struct ControllerState {
    pages: PageStore,
    surface: Box<dyn RenderSurface>,
    unread: UnreadTracker,
    sentinels: VisibilityObserver<Sentinel>,
    /// Reconciliations currently in progress
    dispatched: usize,
    /// Pending change signals caused by our own mark-seen calls
    ignore_messages_changed: usize,
    /// Bumped by every operation that replaces the page set
    view_token: u64,
    jump_to_latest_visible: bool,
}

impl ControllerState {
    fn render(&mut self) {
        self.surface.render(self.pages.state());
    }

    fn apply(&mut self, follow_up: FollowUp) -> Option<LoadRequest> {
        apply_follow_up(follow_up, &self.pages, self.surface.as_mut())
    }

    /// Re-arm observers against the new layout
    fn after_layout(&mut self) {
        self.sentinels.reobserve(Sentinel::Top);
        self.sentinels.reobserve(Sentinel::Bottom);
        self.unread
            .sync_targets(self.pages.state(), self.surface.as_ref());
        self.refresh_affordance();
    }

    fn refresh_affordance(&mut self) {
        let state = self.pages.state();
        let far = is_one_viewport_or_more_from_newest(state, &self.surface.metrics());
        self.jump_to_latest_visible = far || !state.unread_message_ids.is_empty();
    }

    fn next_token(&mut self) -> u64 {
        self.view_token += 1;
        self.view_token
    }
}

pub struct ChatController {
    store: Arc<dyn MessageStore>,
    config: PagerConfig,
    inner: Mutex<ControllerState>,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatController {
    pub fn new(
        store: Arc<dyn MessageStore>,
        surface: Box<dyn RenderSurface>,
        config: PagerConfig,
    ) -> Self {
        let mut sentinels =
            VisibilityObserver::new(IntersectionConfig::sentinel(config.sentinel_margin_px));
        sentinels.observe(Sentinel::Top);
        sentinels.observe(Sentinel::Bottom);

        let state = ControllerState {
            pages: PageStore::new(ChatId::default(), config.page_size),
            surface,
            unread: UnreadTracker::new(config.unread_thresholds.clone()),
            sentinels,
            dispatched: 0,
            ignore_messages_changed: 0,
            view_token: 0,
            jump_to_latest_visible: false,
        };

        Self {
            store,
            config,
            inner: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub async fn active_chat(&self) -> ChatId {
        self.inner.lock().await.pages.chat_id()
    }

    pub async fn page_state(&self) -> PageState {
        self.inner.lock().await.pages.state().clone()
    }

    pub async fn metrics(&self) -> ScrollMetrics {
        self.inner.lock().await.surface.metrics()
    }

    pub async fn visible_items(&self) -> Vec<ItemId> {
        let state = self.inner.lock().await;
        messages_in_view(state.surface.as_ref())
            .map(|view| view.key.item)
            .collect()
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let state = self.inner.lock().await;
        let pages = state.pages.state();
        ViewSnapshot {
            chat_id: pages.chat_id,
            total_items: pages.message_ids.len(),
            loaded_range: pages.loaded_range(),
            page_count: pages.page_ordering.len(),
            metrics: state.surface.metrics(),
            visible: messages_in_view(state.surface.as_ref())
                .map(|view| view.key.item)
                .collect(),
            unread_count: pages.unread_message_ids.len(),
            jump_to_latest_visible: state.jump_to_latest_visible,
        }
    }

    pub async fn is_jump_to_latest_visible(&self) -> bool {
        self.inner.lock().await.jump_to_latest_visible
    }

    /// Show the newest page of `chat_id`, scrolled to the bottom
    pub async fn select_chat(&self, chat_id: ChatId) -> Result<()> {
        let token = self.inner.lock().await.next_token();
        info!(target: "pager.controller", "Selecting chat {}", chat_id);

        let unread = self.store.unread_message_ids(chat_id).await?;
        let marker_one = marker_one_for(&unread);
        let message_ids = self.store.message_ids(chat_id, &marker_one).await?;
        let range = tail_range(message_ids.len(), self.config.page_size);

        let snapshot = SequenceSnapshot {
            chat_id,
            message_ids,
            unread_message_ids: unread,
            marker_one,
        };
        self.install(token, snapshot, range, FollowUp::ScrollToBottomAndFill)
            .await?;
        Ok(())
    }

    /// Show the page around `message_id` with the message at the top of the viewport
    pub async fn jump_to_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let token = self.inner.lock().await.next_token();

        let unread = self.store.unread_message_ids(chat_id).await?;
        let marker_one = marker_one_for(&unread);
        let message_ids = self.store.message_ids(chat_id, &marker_one).await?;

        let Some(index) = message_ids
            .iter()
            .position(|item| *item == ItemId::Message(message_id))
        else {
            warn!(
                target: "pager.controller",
                "Message {} not found in chat {}, selecting the chat instead", message_id, chat_id
            );
            return self.select_chat(chat_id).await;
        };

        let range = range_around(index, message_ids.len(), self.config.page_size);
        let snapshot = SequenceSnapshot {
            chat_id,
            message_ids,
            unread_message_ids: unread,
            marker_one,
        };
        self.install(token, snapshot, range, FollowUp::ScrollToMessageAndFill { index })
            .await?;
        Ok(())
    }

    /// Replace the page set with the single page `range` of `snapshot`, render
    /// it, then run `follow_up`. Returns false when superseded by a newer
    /// operation while fetching.
    async fn install(
        &self,
        token: u64,
        snapshot: SequenceSnapshot,
        range: Option<(usize, usize)>,
        follow_up: FollowUp,
    ) -> Result<bool> {
        let messages = match range {
            Some((first, last)) => {
                let ids: Vec<MessageId> = snapshot.message_ids[first..=last]
                    .iter()
                    .filter_map(ItemId::message_id)
                    .collect();
                self.store.load_messages(snapshot.chat_id, &ids).await?
            }
            None => Vec::new(),
        };

        let next = {
            let mut state = self.inner.lock().await;
            if state.view_token != token {
                debug!(
                    target: "pager.controller",
                    "Discarding superseded view of chat {}", snapshot.chat_id
                );
                return Ok(false);
            }

            if state.pages.chat_id() != snapshot.chat_id {
                state.unread.reset();
                state.ignore_messages_changed = 0;
            }
            match range {
                Some(range) => {
                    state.pages.replace_with_page(snapshot, range, messages);
                }
                None => state.pages.reset(snapshot),
            }

            state.render();
            let next = state.apply(follow_up);
            state.after_layout();
            next
        };

        if let Some(request) = next {
            self.dispatch_load(request).await?;
        }
        self.pump().await?;
        Ok(true)
    }

    /// Fetch and attach one page, then keep going for as long as the follow-up
    /// asks for more.
    async fn dispatch_load(&self, request: LoadRequest) -> Result<LoadOutcome> {
        let mut request = request;
        loop {
            let ticket = {
                let mut state = self.inner.lock().await;
                match state.pages.begin_load(request.direction) {
                    Ok(ticket) => ticket,
                    Err(rejection) => return Ok(rejection.into()),
                }
            };

            let fetched = self
                .store
                .load_messages(ticket.chat_id, &ticket.message_ids())
                .await;

            let mut state = self.inner.lock().await;
            let messages = match fetched {
                Ok(messages) => messages,
                Err(e) => {
                    state.pages.abort_load(&ticket);
                    return Err(e);
                }
            };

            let outcome = state.pages.complete_load(ticket, messages, &request.evict);
            if !outcome.is_loaded() {
                return Ok(outcome);
            }

            state.render();
            let next = request
                .follow_up
                .and_then(|follow_up| state.apply(follow_up));
            state.after_layout();

            match next {
                Some(next) => request = next,
                None => return Ok(outcome),
            }
        }
    }

    async fn load_page(
        &self,
        chat_id: ChatId,
        direction: Direction,
        evict: Vec<PageKey>,
        follow_up: Option<FollowUp>,
    ) -> Result<LoadOutcome> {
        if self.active_chat().await != chat_id {
            debug!(target: "pager.loader", "Load {} for inactive chat {}", direction, chat_id);
            return Ok(LoadOutcome::Stale);
        }
        self.dispatch_load(LoadRequest::new(direction, evict, follow_up))
            .await
    }

    pub async fn load_page_before(
        &self,
        chat_id: ChatId,
        evict: Vec<PageKey>,
        follow_up: Option<FollowUp>,
    ) -> Result<LoadOutcome> {
        self.load_page(chat_id, Direction::Before, evict, follow_up)
            .await
    }

    pub async fn load_page_after(
        &self,
        chat_id: ChatId,
        evict: Vec<PageKey>,
        follow_up: Option<FollowUp>,
    ) -> Result<LoadOutcome> {
        self.load_page(chat_id, Direction::After, evict, follow_up)
            .await
    }

    async fn on_sentinel(&self, sentinel: Sentinel) -> Result<LoadOutcome> {
        let request = {
            let state = self.inner.lock().await;
            let plan = match sentinel {
                Sentinel::Top => plan_top_load,
                Sentinel::Bottom => plan_bottom_load,
            };
            match plan(&state.pages, state.surface.as_ref(), &self.config) {
                Some(request) => request,
                None if state.pages.is_loading() => return Ok(LoadOutcome::Dropped),
                None => return Ok(LoadOutcome::NothingToLoad),
            }
        };
        self.dispatch_load(request).await
    }

    pub async fn on_top_sentinel(&self) -> Result<LoadOutcome> {
        self.on_sentinel(Sentinel::Top).await
    }

    pub async fn on_bottom_sentinel(&self) -> Result<LoadOutcome> {
        self.on_sentinel(Sentinel::Bottom).await
    }

    /// Evaluate observers against the current layout: collect unread elements
    /// that came into view and load pages while a sentinel stays visible.
    pub async fn on_scroll(&self) -> Result<()> {
        self.pump().await
    }

    async fn pump(&self) -> Result<()> {
        for _ in 0..MAX_SENTINEL_ROUNDS {
            let fired: Vec<Sentinel> = {
                let mut guard = self.inner.lock().await;
                let state = &mut *guard;
                let metrics = state.surface.metrics();
                state.unread.evaluate(state.surface.as_ref());
                state.refresh_affordance();
                state
                    .sentinels
                    .evaluate(metrics, |sentinel| Some(sentinel.bounds(metrics)))
                    .into_iter()
                    .filter(|entry| entry.is_intersecting)
                    .map(|entry| entry.target)
                    .collect()
            };
            if fired.is_empty() {
                return Ok(());
            }

            let mut loaded = false;
            for sentinel in fired {
                loaded |= self.on_sentinel(sentinel).await?.is_loaded();
            }
            if !loaded {
                return Ok(());
            }
        }
        debug!(target: "pager.loader", "Stopped loading after {} rounds", MAX_SENTINEL_ROUNDS);
        Ok(())
    }

    pub async fn scroll_to(&self, scroll_top: u32) -> Result<()> {
        self.inner.lock().await.surface.set_scroll_top(scroll_top);
        self.pump().await
    }

    pub async fn scroll_by(&self, delta: i64) -> Result<()> {
        {
            let mut state = self.inner.lock().await;
            let current = i64::from(state.surface.metrics().scroll_top);
            let target = u32::try_from(current.saturating_add(delta).max(0)).unwrap_or(u32::MAX);
            state.surface.set_scroll_top(target);
        }
        self.pump().await
    }

    pub async fn resize(&self, client_height: u32) -> Result<()> {
        self.inner.lock().await.surface.resize(client_height);
        self.pump().await
    }

    /// Reconcile the view with a changed sequence for `chat_id`
    pub async fn on_messages_changed(&self, chat_id: ChatId) -> Result<ReconcileOutcome> {
        let (token, visible, scroll_top, old_ids, previous_marker) = {
            let mut state = self.inner.lock().await;
            if state.pages.chat_id() != chat_id {
                return Ok(ReconcileOutcome::Ignored(IgnoreReason::OtherChat));
            }
            if state.ignore_messages_changed > 0 {
                state.ignore_messages_changed -= 1;
                debug!(target: "pager.reconcile", "Ignoring self-induced change of chat {}", chat_id);
                return Ok(ReconcileOutcome::Ignored(IgnoreReason::SelfInduced));
            }
            if state.dispatched > 0 {
                debug!(target: "pager.reconcile", "Reconciliation already dispatched, rejecting");
                return Ok(ReconcileOutcome::Ignored(IgnoreReason::Busy));
            }

            let metrics = state.surface.metrics();
            if metrics.is_at_bottom() {
                drop(state);
                debug!(target: "pager.reconcile", "At bottom, following the tail of chat {}", chat_id);
                self.select_chat(chat_id).await?;
                return Ok(ReconcileOutcome::FollowedTail);
            }

            state.dispatched += 1;
            let token = state.next_token();
            let visible: Vec<VisibleItem> = messages_in_view(state.surface.as_ref())
                .map(VisibleItem::from)
                .collect();
            let pages = state.pages.state();
            (
                token,
                visible,
                metrics.scroll_top,
                pages.message_ids.clone(),
                pages.marker_one.clone(),
            )
        };

        let result = self
            .reconcile(chat_id, token, &visible, scroll_top, &old_ids, previous_marker)
            .await;
        self.inner.lock().await.dispatched -= 1;
        result
    }

    async fn reconcile(
        &self,
        chat_id: ChatId,
        token: u64,
        visible: &[VisibleItem],
        scroll_top: u32,
        old_ids: &[ItemId],
        previous_marker: MarkerOne,
    ) -> Result<ReconcileOutcome> {
        let unread = self.store.unread_message_ids(chat_id).await?;
        let marker_one = if unread.is_empty() {
            previous_marker
        } else {
            marker_one_for(&unread)
        };
        let message_ids = self.store.message_ids(chat_id, &marker_one).await?;

        let plan = plan_reconciliation(visible, scroll_top, old_ids, &message_ids);
        debug!(target: "pager.reconcile", "Reconciling chat {}: {:?}", chat_id, plan);

        let len = message_ids.len();
        let snapshot = SequenceSnapshot {
            chat_id,
            message_ids,
            unread_message_ids: unread,
            marker_one,
        };

        let (installed, outcome) = match plan {
            ReconcilePlan::Refresh {
                item,
                index,
                relative_offset,
            } => {
                let follow_up = FollowUp::ScrollToMessage {
                    index,
                    relative_offset,
                };
                let range = range_around(index, len, self.config.page_size);
                (
                    self.install(token, snapshot, range, follow_up).await?,
                    ReconcileOutcome::Refreshed { item, index },
                )
            }
            ReconcilePlan::Jump { item, index } => {
                let follow_up = FollowUp::ScrollToMessageAndFill { index };
                let range = range_around(index, len, self.config.page_size);
                (
                    self.install(token, snapshot, range, follow_up).await?,
                    ReconcileOutcome::Jumped { item, index },
                )
            }
            ReconcilePlan::Reselect => {
                if self.inner.lock().await.view_token != token {
                    (false, ReconcileOutcome::Reselected)
                } else {
                    self.select_chat(chat_id).await?;
                    (true, ReconcileOutcome::Reselected)
                }
            }
        };

        if installed {
            Ok(outcome)
        } else {
            Ok(ReconcileOutcome::Ignored(IgnoreReason::Stale))
        }
    }

    /// Append below a loaded tail while the view sits at the bottom; anything
    /// else goes through full reconciliation.
    pub async fn on_incoming_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<ReconcileOutcome> {
        let (token, marker_one) = {
            let state = self.inner.lock().await;
            if state.pages.chat_id() != chat_id {
                return Ok(ReconcileOutcome::Ignored(IgnoreReason::OtherChat));
            }
            let at_bottom = state.surface.metrics().is_at_bottom();
            if !(at_bottom && state.pages.state().is_tail_loaded()) {
                drop(state);
                debug!(
                    target: "pager.reconcile",
                    "Incoming message {} away from a loaded tail, reconciling", message_id
                );
                return self.on_messages_changed(chat_id).await;
            }
            (state.view_token, state.pages.state().marker_one.clone())
        };

        let unread = self.store.unread_message_ids(chat_id).await?;
        let message_ids = self.store.message_ids(chat_id, &marker_one).await?;

        let request = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            if state.view_token != token || state.pages.chat_id() != chat_id {
                return Ok(ReconcileOutcome::Ignored(IgnoreReason::Stale));
            }
            if state.pages.extend_sequence(message_ids, unread) {
                plan_tail_append(&state.pages, state.surface.as_ref(), &self.config)
            } else {
                drop(guard);
                debug!(target: "pager.reconcile", "Sequence changed beyond an append, reconciling");
                return self.on_messages_changed(chat_id).await;
            }
        };

        self.dispatch_load(request).await?;
        self.pump().await?;
        Ok(ReconcileOutcome::AppendedTail)
    }

    /// Report the unread messages collected since the last call as seen.
    /// Store failures are logged, not returned; the batch is then put back so
    /// it is reported again on a later tick.
    pub async fn flush_seen(&self) -> Result<usize> {
        let (chat_id, batch) = {
            let mut state = self.inner.lock().await;
            let batch = state.unread.take_batch();
            if batch.is_empty() {
                return Ok(0);
            }
            state.pages.remove_unread(&batch);
            state.ignore_messages_changed += 1;
            state.refresh_affordance();
            (state.pages.chat_id(), batch)
        };

        if self.mark_seen(chat_id, &batch).await {
            return Ok(batch.len());
        }

        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        if state.pages.chat_id() == chat_id {
            state.ignore_messages_changed = state.ignore_messages_changed.saturating_sub(1);
            state.pages.restore_unread(&batch);
            state.unread.release(&batch);
            state
                .unread
                .sync_targets(state.pages.state(), state.surface.as_ref());
            state.unread.evaluate(state.surface.as_ref());
            state.refresh_affordance();
        }
        Ok(0)
    }

    /// Returns false when the store rejected the call
    async fn mark_seen(&self, chat_id: ChatId, ids: &[MessageId]) -> bool {
        debug!(target: "pager.unread", "Marking {} message(s) of chat {} seen", ids.len(), chat_id);
        match self.store.mark_messages_seen(chat_id, ids).await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "pager.unread", "Failed to mark messages seen in chat {}: {}", chat_id, e);
                false
            }
        }
    }

    /// Mark everything unread as seen, then show the newest messages
    pub async fn jump_to_latest(&self) -> Result<()> {
        let (chat_id, unread) = {
            let mut state = self.inner.lock().await;
            let chat_id = state.pages.chat_id();
            let unread = state.pages.state().unread_message_ids.clone();
            if !unread.is_empty() {
                state.pages.remove_unread(&unread);
                state.ignore_messages_changed += 1;
            }
            (chat_id, unread)
        };

        if !unread.is_empty() && !self.mark_seen(chat_id, &unread).await {
            let mut state = self.inner.lock().await;
            if state.pages.chat_id() == chat_id {
                state.ignore_messages_changed = state.ignore_messages_changed.saturating_sub(1);
            }
        }
        // Reselecting refetches the unread set from the store
        self.select_chat(chat_id).await
    }

    /// Handle one event. Returns false once the loop should stop.
    pub async fn handle_event(&self, event: ChatEvent) -> Result<bool> {
        match event {
            ChatEvent::MessagesChanged { chat_id } => {
                self.on_messages_changed(chat_id).await?;
            }
            ChatEvent::IncomingMessage {
                chat_id,
                message_id,
            } => {
                self.on_incoming_message(chat_id, message_id).await?;
            }
            ChatEvent::SelectChat { chat_id } => self.select_chat(chat_id).await?,
            ChatEvent::JumpToMessage {
                chat_id,
                message_id,
            } => self.jump_to_message(chat_id, message_id).await?,
            ChatEvent::Scrolled { scroll_top } => self.scroll_to(scroll_top).await?,
            ChatEvent::ScrollBy { delta } => self.scroll_by(delta).await?,
            ChatEvent::Resized { client_height } => self.resize(client_height).await?,
            ChatEvent::JumpToLatest => self.jump_to_latest().await?,
            ChatEvent::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Consume events until `Shutdown`. Everything queued when the loop wakes
    /// is one tick; read receipts are flushed at the end of each tick.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) -> Result<()> {
        info!(target: "pager.controller", "Starting chat controller event loop");
        loop {
            let Some(first) = events.recv().await else {
                return Err(Error::ChannelClosed(
                    "event sender dropped without shutdown".to_string(),
                ));
            };

            let mut tick = vec![first];
            while let Ok(event) = events.try_recv() {
                tick.push(event);
            }
            debug!(target: "pager.controller", "Processing tick of {} event(s)", tick.len());

            let mut keep_running = true;
            for event in tick {
                match self.handle_event(event).await {
                    Ok(true) => {}
                    Ok(false) => {
                        keep_running = false;
                        break;
                    }
                    Err(e) => warn!(target: "pager.controller", "Event handling failed: {}", e),
                }
            }

            if let Err(e) = self.flush_seen().await {
                warn!(target: "pager.controller", "Failed to flush read receipts: {}", e);
            }
            if !keep_running {
                info!(target: "pager.controller", "Chat controller event loop stopped");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::surface::{HeightModel, SimulatedSurface};
    use crate::test_utils::GatedStore;

    const CHAT: ChatId = ChatId(1);
    const JAN_FIRST: i64 = 1_704_067_200;

    fn config(page_size: usize) -> PagerConfig {
        PagerConfig {
            page_size,
            ..PagerConfig::default()
        }
    }

    async fn seeded(count: usize, unread: usize) -> (InMemoryStore, Vec<MessageId>) {
        let store = InMemoryStore::new();
        let ids = store.seed_chat(CHAT, count, unread, JAN_FIRST).await;
        (store, ids)
    }

    fn controller(store: Arc<dyn MessageStore>, page_size: usize, viewport: u32) -> ChatController {
        ChatController::new(
            store,
            Box::new(SimulatedSurface::new(viewport, HeightModel::Uniform(20))),
            config(page_size),
        )
    }

    #[tokio::test]
    async fn select_chat_shows_the_bottom() {
        let (store, ids) = seeded(200, 0).await;
        let controller = controller(Arc::new(store), 30, 400);

        controller.select_chat(CHAT).await.unwrap();
        let snapshot = controller.snapshot().await;

        assert!(snapshot.metrics.is_at_bottom());
        assert_eq!(
            snapshot.visible.last(),
            Some(&ItemId::Message(*ids.last().unwrap()))
        );
        assert!(!snapshot.jump_to_latest_visible);
        let (_, last) = snapshot.loaded_range.unwrap();
        assert_eq!(last, snapshot.total_items - 1);
    }

    #[tokio::test]
    async fn short_pages_keep_loading_until_the_viewport_fills() {
        let (store, _) = seeded(100, 0).await;
        // 5 entries x 20px never fill 400px on their own
        let controller = controller(Arc::new(store), 5, 400);

        controller.select_chat(CHAT).await.unwrap();
        let metrics = controller.metrics().await;
        assert!(metrics.scroll_height > metrics.client_height);
        assert!(controller.page_state().await.is_contiguous());
    }

    #[tokio::test]
    async fn scrolling_up_loads_and_keeps_content_in_place() {
        let (store, _) = seeded(500, 0).await;
        let controller = controller(Arc::new(store), 30, 200);
        controller.select_chat(CHAT).await.unwrap();

        let before = controller.page_state().await.loaded_range().unwrap();
        controller.scroll_to(0).await.unwrap();
        let visible_at_top = controller.visible_items().await;
        let after = controller.page_state().await.loaded_range().unwrap();

        assert!(after.0 < before.0);
        let metrics = controller.metrics().await;
        assert!(metrics.scroll_top > 0);
        assert!(!visible_at_top.is_empty());
        assert!(controller.is_jump_to_latest_visible().await);
    }

    #[tokio::test]
    async fn long_scroll_up_evicts_bottom_pages() {
        let (store, _) = seeded(2_000, 0).await;
        let controller = controller(Arc::new(store), 30, 200);
        controller.select_chat(CHAT).await.unwrap();

        for _ in 0..40 {
            controller.scroll_to(0).await.unwrap();
        }
        let state = controller.page_state().await;
        let metrics = controller.metrics().await;

        assert!(state.is_contiguous());
        assert!(!state.is_tail_loaded());
        assert!(metrics.scroll_height > metrics.client_height * 4);
        // 30 items x 20px per page; a handful of pages is enough for 4 viewports
        assert!(state.page_ordering.len() <= 6);
    }

    #[tokio::test]
    async fn concurrent_loads_in_one_direction_are_dropped() {
        let (store, _) = seeded(300, 0).await;
        let gated = Arc::new(GatedStore::new(store));
        let controller = Arc::new(controller(gated.clone(), 30, 200));
        controller.select_chat(CHAT).await.unwrap();
        let loads_before = gated.load_calls();

        gated.close_gate();
        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.load_page_before(CHAT, Vec::new(), None).await })
        };
        gated.entered().await;

        let second = controller
            .load_page_before(CHAT, Vec::new(), None)
            .await
            .unwrap();
        assert_eq!(second, LoadOutcome::Dropped);

        gated.open_gate();
        let first = first.await.unwrap().unwrap();
        assert!(first.is_loaded());
        assert_eq!(gated.load_calls() - loads_before, 1);
    }

    #[tokio::test]
    async fn change_at_bottom_follows_the_tail() {
        let (store, _) = seeded(100, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();

        store.push_message(CHAT, "frank", "late", true).await.unwrap();
        let outcome = controller.on_messages_changed(CHAT).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::FollowedTail);
        assert!(controller.page_state().await.is_tail_loaded());
    }

    #[tokio::test]
    async fn other_chats_are_ignored() {
        let (store, _) = seeded(10, 0).await;
        let controller = controller(Arc::new(store), 30, 200);
        controller.select_chat(CHAT).await.unwrap();

        assert_eq!(
            controller.on_messages_changed(ChatId(2)).await.unwrap(),
            ReconcileOutcome::Ignored(IgnoreReason::OtherChat)
        );
    }

    #[tokio::test]
    async fn deletion_above_keeps_the_visible_message_in_place() {
        let (store, ids) = seeded(300, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();
        controller.scroll_by(-300).await.unwrap();

        let visible = controller.visible_items().await;
        let anchor = visible
            .iter()
            .copied()
            .find(|item| !item.is_marker())
            .unwrap();
        let anchor_top = {
            let state = controller.inner.lock().await;
            let metrics = state.surface.metrics();
            let element = state
                .surface
                .rendered_messages()
                .iter()
                .find(|e| e.key.item == anchor)
                .copied()
                .unwrap();
            i64::from(element.bounds.top) - i64::from(metrics.scroll_top)
        };

        store.remove_messages(CHAT, &ids[250..252]).await.unwrap();
        let outcome = controller.on_messages_changed(CHAT).await.unwrap();
        let ReconcileOutcome::Refreshed { item, .. } = outcome else {
            panic!("expected a refresh, got {outcome:?}");
        };
        assert_eq!(item, anchor);

        let state = controller.inner.lock().await;
        let metrics = state.surface.metrics();
        let element = state
            .surface
            .rendered_messages()
            .iter()
            .find(|e| e.key.item == anchor)
            .copied()
            .unwrap();
        assert_eq!(
            i64::from(element.bounds.top) - i64::from(metrics.scroll_top),
            anchor_top
        );
    }

    #[tokio::test]
    async fn deleting_the_whole_view_jumps_to_a_neighbour() {
        let (store, _) = seeded(300, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();
        controller.scroll_by(-600).await.unwrap();

        let visible: Vec<MessageId> = controller
            .visible_items()
            .await
            .iter()
            .filter_map(ItemId::message_id)
            .collect();
        store.remove_messages(CHAT, &visible).await.unwrap();

        let outcome = controller.on_messages_changed(CHAT).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Jumped { .. }));
        let remaining = controller.visible_items().await;
        assert!(remaining.iter().all(|item| match item.message_id() {
            Some(id) => !visible.contains(&id),
            None => true,
        }));
    }

    #[tokio::test]
    async fn deleting_everything_reselects() {
        let (store, ids) = seeded(100, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();
        controller.scroll_by(-200).await.unwrap();

        store.remove_messages(CHAT, &ids).await.unwrap();
        let fetches = store.stats().id_fetches;
        assert_eq!(
            controller.on_messages_changed(CHAT).await.unwrap(),
            ReconcileOutcome::Reselected
        );
        // One fetch to reconcile, one for the single reselect
        assert_eq!(store.stats().id_fetches - fetches, 2);
        assert_eq!(controller.snapshot().await.total_items, 0);
    }

    #[tokio::test]
    async fn incoming_message_at_bottom_is_appended() {
        let (store, _) = seeded(100, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();
        let ids_fetched = store.stats().id_fetches;

        let id = store.push_message(CHAT, "gina", "new", false).await.unwrap();
        let outcome = controller.on_incoming_message(CHAT, id).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::AppendedTail);
        assert_eq!(store.stats().id_fetches - ids_fetched, 1);
        let snapshot = controller.snapshot().await;
        assert!(snapshot.metrics.is_at_bottom());
        assert_eq!(snapshot.visible.last(), Some(&ItemId::Message(id)));
    }

    #[tokio::test]
    async fn incoming_message_while_scrolled_up_reconciles() {
        let (store, _) = seeded(300, 0).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.select_chat(CHAT).await.unwrap();
        controller.scroll_by(-400).await.unwrap();
        let visible = controller.visible_items().await;

        let id = store.push_message(CHAT, "gina", "new", false).await.unwrap();
        let outcome = controller.on_incoming_message(CHAT, id).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Refreshed { .. }));
        assert_eq!(controller.visible_items().await, visible);
    }

    #[tokio::test]
    async fn seen_batch_is_one_call_and_ignored_once() {
        let (store, _) = seeded(50, 3).await;
        let controller = controller(Arc::new(store.clone()), 30, 400);
        controller.select_chat(CHAT).await.unwrap();

        assert_eq!(controller.flush_seen().await.unwrap(), 3);
        let stats = store.stats();
        assert_eq!(stats.seen_calls, 1);
        assert_eq!(stats.seen_ids, 3);
        assert!(store.unread_message_ids(CHAT).await.unwrap().is_empty());
        assert!(controller.page_state().await.unread_message_ids.is_empty());

        // The store's change signal for our own call is swallowed exactly once
        assert_eq!(
            controller.on_messages_changed(CHAT).await.unwrap(),
            ReconcileOutcome::Ignored(IgnoreReason::SelfInduced)
        );
        assert_eq!(controller.flush_seen().await.unwrap(), 0);
        assert_eq!(store.stats().seen_calls, 1);
    }

    #[tokio::test]
    async fn failed_read_receipt_keeps_messages_unread() {
        let (store, ids) = seeded(300, 3).await;
        let gated = Arc::new(GatedStore::new(store));
        let controller = controller(gated.clone(), 30, 400);
        controller.select_chat(CHAT).await.unwrap();

        gated.set_fail_seen(true);
        assert_eq!(controller.flush_seen().await.unwrap(), 0);
        assert_eq!(gated.inner().unread_message_ids(CHAT).await.unwrap().len(), 3);
        assert_eq!(controller.page_state().await.unread_message_ids.len(), 3);
        assert!(controller.is_jump_to_latest_visible().await);

        // A real change is not mistaken for our own receipt
        gated.inner().remove_messages(CHAT, &ids[..5]).await.unwrap();
        assert_eq!(
            controller.on_messages_changed(CHAT).await.unwrap(),
            ReconcileOutcome::FollowedTail
        );

        // The same messages go out again once the store recovers
        gated.set_fail_seen(false);
        controller.on_scroll().await.unwrap();
        assert_eq!(controller.flush_seen().await.unwrap(), 3);
        assert!(gated.inner().unread_message_ids(CHAT).await.unwrap().is_empty());
        assert_eq!(gated.inner().stats().seen_ids, 3);
    }

    #[tokio::test]
    async fn failed_page_fetch_releases_the_load_guard() {
        let (store, _) = seeded(300, 0).await;
        let gated = Arc::new(GatedStore::new(store));
        let controller = controller(gated.clone(), 30, 300);
        controller.select_chat(CHAT).await.unwrap();
        let range_before = controller.page_state().await.loaded_range();

        gated.set_fail_loads(true);
        let result = controller.load_page_before(CHAT, Vec::new(), None).await;
        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(controller.page_state().await.loaded_range(), range_before);

        gated.set_fail_loads(false);
        let outcome = controller
            .load_page_before(CHAT, Vec::new(), None)
            .await
            .unwrap();
        assert!(outcome.is_loaded());
    }

    #[tokio::test]
    async fn failed_select_leaves_the_view_untouched() {
        let (store, _) = seeded(60, 0).await;
        let gated = Arc::new(GatedStore::new(store));
        let controller = controller(gated.clone(), 30, 300);
        controller.select_chat(CHAT).await.unwrap();
        let before = controller.snapshot().await;

        gated.set_fail_loads(true);
        assert!(controller.select_chat(CHAT).await.is_err());
        assert_eq!(controller.snapshot().await, before);
    }

    #[tokio::test]
    async fn jump_to_message_puts_it_at_the_top() {
        let (store, ids) = seeded(500, 0).await;
        let controller = controller(Arc::new(store), 30, 200);
        controller.select_chat(CHAT).await.unwrap();

        controller.jump_to_message(CHAT, ids[100]).await.unwrap();
        {
            let state = controller.inner.lock().await;
            let target = state
                .surface
                .rendered_messages()
                .iter()
                .find(|e| e.key.item == ItemId::Message(ids[100]))
                .copied()
                .unwrap();
            assert_eq!(target.bounds.top, state.surface.metrics().scroll_top);
        }
        assert!(controller.is_jump_to_latest_visible().await);
    }

    #[tokio::test]
    async fn jump_to_latest_marks_everything_seen() {
        let (store, ids) = seeded(500, 200).await;
        let controller = controller(Arc::new(store.clone()), 30, 200);
        controller.jump_to_message(CHAT, ids[10]).await.unwrap();

        controller.jump_to_latest().await.unwrap();
        assert!(store.unread_message_ids(CHAT).await.unwrap().is_empty());
        let snapshot = controller.snapshot().await;
        assert!(snapshot.metrics.is_at_bottom());
        assert!(!snapshot.jump_to_latest_visible);
    }

    #[tokio::test]
    async fn run_processes_ticks_until_shutdown() {
        let (tx, rx) = mpsc::channel(32);
        let store = InMemoryStore::new().with_events(tx.clone());
        store.seed_chat(CHAT, 80, 2, JAN_FIRST).await;
        let controller = controller(Arc::new(store.clone()), 30, 300);

        tx.send(ChatEvent::SelectChat { chat_id: CHAT }).await.unwrap();
        tx.send(ChatEvent::Shutdown).await.unwrap();
        controller.run(rx).await.unwrap();

        assert_eq!(store.stats().seen_calls, 1);
        assert_eq!(controller.active_chat().await, CHAT);
    }

    #[tokio::test]
    async fn run_reports_a_dropped_sender() {
        let (tx, rx) = mpsc::channel::<ChatEvent>(1);
        drop(tx);
        let (store, _) = seeded(1, 0).await;
        let controller = controller(Arc::new(store), 30, 300);

        assert!(matches!(
            controller.run(rx).await,
            Err(Error::ChannelClosed(_))
        ));
    }
}
