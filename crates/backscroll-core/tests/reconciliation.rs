use backscroll_core::{
    ChatController, ChatEvent, ChatId, HeightModel, IgnoreReason, InMemoryStore, ItemId,
    LoadOutcome, MessageId, MessageStore, PagerConfig, ReconcileOutcome, SimulatedSurface,
};
use std::sync::Arc;
use tokio::sync::mpsc;

const CHAT: ChatId = ChatId(21);
const OTHER_CHAT: ChatId = ChatId(22);
const JAN_FIRST: i64 = 1_704_067_200;

fn controller_for(store: Arc<dyn MessageStore>, viewport: u32) -> ChatController {
    ChatController::new(
        store,
        Box::new(SimulatedSurface::new(viewport, HeightModel::Uniform(20))),
        PagerConfig::default(),
    )
}

/// Feed every queued store notification to the controller
async fn drain(controller: &ChatController, events: &mut mpsc::Receiver<ChatEvent>) -> usize {
    let mut handled = 0;
    while let Ok(event) = events.try_recv() {
        controller.handle_event(event).await.unwrap();
        handled += 1;
    }
    handled
}

#[tokio::test]
async fn store_notifications_drive_reconciliation() {
    let (tx, mut rx) = mpsc::channel(64);
    let store = InMemoryStore::new().with_events(tx);
    let ids = store.seed_chat(CHAT, 400, 0, JAN_FIRST).await;
    let controller = controller_for(Arc::new(store.clone()), 300);

    controller.select_chat(CHAT).await.unwrap();
    controller.scroll_by(-250).await.unwrap();
    let visible_before = controller.visible_items().await;
    let first_message = visible_before
        .iter()
        .find_map(ItemId::message_id)
        .unwrap();

    // A deletion far above the window does not move what is on screen
    store.remove_messages(CHAT, &ids[10..20]).await.unwrap();
    assert_eq!(drain(&controller, &mut rx).await, 1);
    let visible_after = controller.visible_items().await;
    assert!(visible_after.contains(&ItemId::Message(first_message)));
    assert_eq!(visible_after, visible_before);
}

#[tokio::test]
async fn our_own_read_receipts_do_not_trigger_reconciliation() {
    let (tx, mut rx) = mpsc::channel(64);
    let store = InMemoryStore::new().with_events(tx);
    store.seed_chat(CHAT, 100, 4, JAN_FIRST).await;
    let controller = controller_for(Arc::new(store.clone()), 400);

    controller.select_chat(CHAT).await.unwrap();
    controller.scroll_by(-100).await.unwrap();
    assert_eq!(controller.flush_seen().await.unwrap(), 4);

    let fetches = store.stats().id_fetches;
    assert_eq!(drain(&controller, &mut rx).await, 1);
    assert_eq!(store.stats().id_fetches, fetches);

    // The next genuine change is reconciled again
    assert!(!matches!(
        controller.on_messages_changed(CHAT).await.unwrap(),
        ReconcileOutcome::Ignored(_)
    ));
}

#[tokio::test]
async fn incoming_messages_follow_the_tail() {
    let (tx, mut rx) = mpsc::channel(64);
    let store = InMemoryStore::new().with_events(tx);
    store.seed_chat(CHAT, 120, 0, JAN_FIRST).await;
    let controller = controller_for(Arc::new(store.clone()), 300);
    controller.select_chat(CHAT).await.unwrap();

    let mut last = MessageId(0);
    for i in 0..45 {
        last = store
            .push_message(CHAT, "hal", &format!("update {i}"), false)
            .await
            .unwrap();
        drain(&controller, &mut rx).await;
    }

    let snapshot = controller.snapshot().await;
    assert!(snapshot.metrics.is_at_bottom());
    assert_eq!(snapshot.visible.last(), Some(&ItemId::Message(last)));
    assert!(controller.page_state().await.is_contiguous());
}

#[tokio::test]
async fn changes_to_another_chat_are_ignored() {
    let store = InMemoryStore::new();
    store.seed_chat(CHAT, 50, 0, JAN_FIRST).await;
    store.seed_chat(OTHER_CHAT, 50, 0, JAN_FIRST).await;
    let controller = controller_for(Arc::new(store.clone()), 300);

    controller.select_chat(CHAT).await.unwrap();
    controller.select_chat(OTHER_CHAT).await.unwrap();

    assert_eq!(
        controller.on_messages_changed(CHAT).await.unwrap(),
        ReconcileOutcome::Ignored(IgnoreReason::OtherChat)
    );
    assert_eq!(
        controller
            .load_page_before(CHAT, Vec::new(), None)
            .await
            .unwrap(),
        LoadOutcome::Stale
    );
}
