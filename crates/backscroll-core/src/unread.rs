//! Watches unread messages and batches the ones that came into view

use crate::page_store::PageState;
use crate::surface::RenderSurface;
use crate::types::{ItemId, MessageId, MessageKey};
use crate::visibility::{IntersectionConfig, VisibilityObserver};
use indexmap::IndexSet;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
pub struct UnreadTracker {
    observer: VisibilityObserver<MessageKey>,
    pending: IndexSet<MessageId>,
    /// Ids already collected; never reported again
    marked: HashSet<MessageId>,
}

impl UnreadTracker {
    pub fn new(thresholds: Vec<f64>) -> Self {
        Self {
            observer: VisibilityObserver::new(IntersectionConfig::unread(thresholds)),
            pending: IndexSet::new(),
            marked: HashSet::new(),
        }
    }

    /// Observe the rendered elements of unread messages and drop targets that
    /// are no longer rendered.
    pub fn sync_targets(&mut self, state: &PageState, surface: &dyn RenderSurface) {
        let rendered: HashSet<MessageKey> = surface
            .rendered_messages()
            .iter()
            .map(|element| element.key)
            .collect();
        self.observer.retain(|key| rendered.contains(key));

        for element in surface.rendered_messages() {
            let ItemId::Message(id) = element.key.item else {
                continue;
            };
            if state.unread_message_ids.contains(&id) && !self.marked.contains(&id) {
                self.observer.observe(element.key);
            }
        }
    }

    /// Collect every observed element that is now intersecting. Returns how many
    /// ids were added to the pending batch.
    pub fn evaluate(&mut self, surface: &dyn RenderSurface) -> usize {
        let entries = self.observer.evaluate(surface.metrics(), |key| {
            surface
                .rendered_messages()
                .iter()
                .find(|element| element.key == *key)
                .map(|element| element.bounds)
        });

        let mut collected = 0;
        for entry in entries {
            if !entry.is_intersecting {
                continue;
            }
            self.observer.unobserve(&entry.target);
            let Some(id) = entry.target.item.message_id() else {
                continue;
            };
            if self.marked.insert(id) {
                debug!(target: "pager.unread", "message {} came into view (ratio {:.2})", id, entry.ratio);
                self.pending.insert(id);
                collected += 1;
            }
        }
        collected
    }

    /// Forget that `ids` were collected so they are observed and reported again
    pub fn release(&mut self, ids: &[MessageId]) {
        for id in ids {
            self.marked.remove(id);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the ids collected since the last batch, in the order they were seen
    pub fn take_batch(&mut self) -> Vec<MessageId> {
        self.pending.drain(..).collect()
    }

    pub fn observed_count(&self) -> usize {
        self.observer.observed().count()
    }

    pub fn reset(&mut self) {
        self.observer.disconnect();
        self.pending.clear();
        self.marked.clear();
    }
}
