use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use backscroll_core::{
    ChatController, ChatEvent, ChatId, HeightModel, IgnoreReason, InMemoryStore, ItemId,
    MessageId, PagerConfig, ReconcileOutcome, SimulatedSurface,
};
use eyre::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

const CHAT: ChatId = ChatId(1);
// 2024-01-01T00:00:00Z, fixed so runs are reproducible
const SEED_START: i64 = 1_704_067_200;

pub struct SimulateCommand {
    pub messages: usize,
    pub unread: usize,
    pub viewport: u32,
    pub steps: usize,
    pub config: PagerConfig,
}

#[async_trait]
impl Command for SimulateCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout).await.map_err(Into::into)
    }
}

/// One step of the run after the controller has settled
struct Step<'a> {
    label: String,
    seen: usize,
    outcome: Option<&'a ReconcileOutcome>,
}

impl SimulateCommand {
    pub async fn run<W: Write + Send>(&self, out: &mut W) -> std::result::Result<(), Error> {
        self.config.validate()?;
        if self.viewport == 0 {
            return Err(Error::Config("viewport must be at least 1px".to_string()));
        }

        let (tx, mut rx) = mpsc::channel(256);
        let store = InMemoryStore::new().with_events(tx);
        store
            .seed_chat(CHAT, self.messages, self.unread, SEED_START)
            .await;
        info!(
            "Seeded chat {} with {} messages ({} unread)",
            CHAT, self.messages, self.unread
        );

        let controller = ChatController::new(
            Arc::new(store.clone()),
            Box::new(SimulatedSurface::new(self.viewport, HeightModel::default())),
            self.config.clone(),
        );

        controller.select_chat(CHAT).await?;
        let seen = controller.flush_seen().await?;
        let outcomes = drain(&controller, &mut rx).await?;
        report(out, &controller, step("select", seen, &outcomes)).await?;

        for n in 1..=self.steps {
            controller.scroll_by(-i64::from(self.viewport)).await?;
            let seen = controller.flush_seen().await?;
            let outcomes = drain(&controller, &mut rx).await?;
            report(out, &controller, step(&format!("scroll up {n}"), seen, &outcomes)).await?;
        }

        // Everything on screen disappears; reconciliation has to find a new anchor
        let doomed: Vec<MessageId> = controller
            .visible_items()
            .await
            .iter()
            .filter_map(ItemId::message_id)
            .collect();
        let removed = store.remove_messages(CHAT, &doomed).await?;
        let outcomes = drain(&controller, &mut rx).await?;
        let seen = controller.flush_seen().await?;
        report(
            out,
            &controller,
            step(&format!("delete {removed}"), seen, &outcomes),
        )
        .await?;

        store
            .push_message(CHAT, "simulator", "a new message arrives", false)
            .await?;
        let outcomes = drain(&controller, &mut rx).await?;
        let seen = controller.flush_seen().await?;
        report(out, &controller, step("incoming", seen, &outcomes)).await?;

        controller.jump_to_latest().await?;
        let seen = controller.flush_seen().await?;
        let outcomes = drain(&controller, &mut rx).await?;
        report(out, &controller, step("jump to latest", seen, &outcomes)).await?;

        Ok(())
    }
}

fn step<'a>(label: &str, seen: usize, outcomes: &'a [ReconcileOutcome]) -> Step<'a> {
    Step {
        label: label.to_string(),
        seen,
        outcome: outcomes
            .iter()
            .rev()
            .find(|outcome| !matches!(outcome, ReconcileOutcome::Ignored(IgnoreReason::SelfInduced))),
    }
}

/// Deliver every store notification queued so far
async fn drain(
    controller: &ChatController,
    events: &mut mpsc::Receiver<ChatEvent>,
) -> backscroll_core::Result<Vec<ReconcileOutcome>> {
    let mut outcomes = Vec::new();
    while let Ok(event) = events.try_recv() {
        debug!("Delivering {:?}", event);
        let outcome = match event {
            ChatEvent::MessagesChanged { chat_id } => controller.on_messages_changed(chat_id).await?,
            ChatEvent::IncomingMessage {
                chat_id,
                message_id,
            } => controller.on_incoming_message(chat_id, message_id).await?,
            other => {
                controller.handle_event(other).await?;
                continue;
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn report<W: Write + Send>(
    out: &mut W,
    controller: &ChatController,
    step: Step<'_>,
) -> std::result::Result<(), Error> {
    let snapshot = controller.snapshot().await;
    let range = match snapshot.loaded_range {
        Some((first, last)) => format!("{first}-{last}"),
        None => "-".to_string(),
    };
    let outcome = step
        .outcome
        .map_or_else(String::new, |outcome| format!(" {outcome:?}"));

    writeln!(
        out,
        "{:<16} items {} of {} pages {} top {}/{} jump {} unread {} seen {}{}",
        step.label,
        range,
        snapshot.total_items,
        snapshot.page_count,
        snapshot.metrics.scroll_top,
        snapshot.metrics.max_scroll_top(),
        if snapshot.jump_to_latest_visible {
            "yes"
        } else {
            "no"
        },
        snapshot.unread_count,
        step.seen,
        outcome,
    )?;
    Ok(())
}
