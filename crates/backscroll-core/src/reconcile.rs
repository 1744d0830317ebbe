//! Re-deriving the viewport position after the authoritative sequence changed
//! underneath the view.

use crate::geometry::InView;
use crate::types::{ItemId, MessageId};
use std::collections::HashMap;

/// Indices of `[0, len)` ordered by distance from `index`, excluding `index`
/// itself: `index+1, index-1, index+2, index-2, ...`. Restartable by cloning.
#[derive(Debug, Clone)]
pub struct RotateAway {
    index: usize,
    len: usize,
    distance: usize,
    lower_pending: bool,
}

impl Iterator for RotateAway {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.lower_pending {
                self.lower_pending = false;
                if let Some(lower) = self.index.checked_sub(self.distance)
                    && lower < self.len
                {
                    return Some(lower);
                }
                continue;
            }

            self.distance += 1;
            if self.distance > self.index && self.index.saturating_add(self.distance) >= self.len {
                return None;
            }
            self.lower_pending = true;
            let upper = self.index + self.distance;
            if upper < self.len {
                return Some(upper);
            }
        }
    }
}

pub fn rotate_away_from_index(index: usize, len: usize) -> RotateAway {
    RotateAway {
        index,
        len,
        distance: 0,
        lower_pending: false,
    }
}

/// Where each item sits in a freshly fetched sequence
#[derive(Debug)]
pub struct IdIndex<'a> {
    ids: &'a [ItemId],
    positions: HashMap<MessageId, usize>,
}

impl<'a> IdIndex<'a> {
    pub fn new(ids: &'a [ItemId]) -> Self {
        let mut positions = HashMap::with_capacity(ids.len());
        for (index, item) in ids.iter().enumerate() {
            if let Some(id) = item.message_id() {
                positions.entry(id).or_insert(index);
            }
        }
        Self { ids, positions }
    }

    /// New index of `item`, last seen at `old_index`. Markers carry no identity,
    /// so one is only accepted when the same marker is still at the same index.
    pub fn locate(&self, item: ItemId, old_index: usize) -> Option<usize> {
        match item {
            ItemId::Message(id) => self.positions.get(&id).copied(),
            ItemId::DayMarker { .. } | ItemId::UnreadMarker => {
                (self.ids.get(old_index) == Some(&item)).then_some(old_index)
            }
        }
    }
}

/// A rendered element that was in view when the change arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleItem {
    pub item: ItemId,
    /// Index into the sequence the element was rendered from
    pub index: usize,
    pub top: u32,
}

impl From<InView> for VisibleItem {
    fn from(view: InView) -> Self {
        Self {
            item: view.key.item,
            index: view.key.index,
            top: view.top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// A visible item survived: rebuild around it and keep it at the same pixel offset
    Refresh {
        item: ItemId,
        index: usize,
        relative_offset: i64,
    },
    /// Nothing visible survived; jump to the nearest surviving neighbour
    Jump { item: ItemId, index: usize },
    /// Nothing to anchor on at all
    Reselect,
}

pub fn plan_reconciliation(
    visible: &[VisibleItem],
    scroll_top: u32,
    old_ids: &[ItemId],
    new_ids: &[ItemId],
) -> ReconcilePlan {
    let Some(first_visible) = visible.first() else {
        return ReconcilePlan::Reselect;
    };
    let index = IdIndex::new(new_ids);

    for candidate in visible {
        if let Some(new_index) = index.locate(candidate.item, candidate.index) {
            return ReconcilePlan::Refresh {
                item: candidate.item,
                index: new_index,
                relative_offset: i64::from(scroll_top) - i64::from(candidate.top),
            };
        }
    }

    for old_index in rotate_away_from_index(first_visible.index, old_ids.len()) {
        let item = old_ids[old_index];
        if let Some(new_index) = index.locate(item, old_index) {
            return ReconcilePlan::Jump {
                item,
                index: new_index,
            };
        }
    }

    ReconcilePlan::Reselect
}
