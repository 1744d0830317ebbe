//! Actions run against the surface after the render that follows a page store mutation

use crate::page_store::PageStore;
use crate::policy::LoadRequest;
use crate::surface::RenderSurface;
use crate::types::{Direction, ViewportAnchor};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Scroll to the bottom; keep loading earlier pages until the viewport is filled
    ScrollToBottomAndFill,
    /// Put the message at `index` at the top of the viewport, loading around it
    /// while the content does not fill the viewport
    ScrollToMessageAndFill { index: usize },
    /// `scroll_top = element_top + relative_offset`, loading neighbours when the
    /// content is too short to reach that position
    ScrollToMessage { index: usize, relative_offset: i64 },
    /// Put the anchored element back where it was on screen
    RestoreAnchor(ViewportAnchor),
}

fn offset_scroll_top(element_top: u32, offset: i64) -> u32 {
    let target = i64::from(element_top).saturating_add(offset).max(0);
    u32::try_from(target).unwrap_or(u32::MAX)
}

/// Apply `follow_up` to the freshly rendered surface. Returns the next load to
/// dispatch when the follow-up wants more content.
pub fn apply_follow_up(
    follow_up: FollowUp,
    pages: &PageStore,
    surface: &mut dyn RenderSurface,
) -> Option<LoadRequest> {
    let state = pages.state();
    match follow_up {
        FollowUp::ScrollToBottomAndFill => {
            surface.scroll_to_bottom();
            let metrics = surface.metrics();
            let first = state.page_ordering.first()?;
            if metrics.scroll_height <= metrics.client_height && pages.can_load_page_before(first) {
                debug!(target: "pager.loader", "content does not fill the viewport, loading before");
                return Some(LoadRequest::new(Direction::Before, Vec::new(), Some(follow_up)));
            }
            None
        }
        FollowUp::ScrollToMessageAndFill { index } => {
            let Some(bounds) = surface.element_bounds(index) else {
                warn!(target: "pager.loader", "no rendered element at index {}, not scrolling", index);
                return None;
            };
            surface.set_scroll_top(bounds.top);
            let metrics = surface.metrics();
            let page = state.page_containing(index)?.key;

            if metrics.scroll_top == 0 && pages.can_load_page_before(&page) {
                debug!(target: "pager.loader", "message {} at the very top, loading before", index);
                Some(LoadRequest::new(Direction::Before, Vec::new(), Some(follow_up)))
            } else if metrics.scroll_height.saturating_sub(metrics.scroll_top) <= metrics.client_height
                && state
                    .page_ordering
                    .last()
                    .is_some_and(|last| pages.can_load_page_after(last))
            {
                debug!(target: "pager.loader", "content below message {} does not fill the viewport, loading after", index);
                Some(LoadRequest::new(Direction::After, Vec::new(), Some(follow_up)))
            } else {
                None
            }
        }
        FollowUp::ScrollToMessage {
            index,
            relative_offset,
        } => {
            let Some(bounds) = surface.element_bounds(index) else {
                warn!(target: "pager.loader", "no rendered element at index {}, not scrolling", index);
                return None;
            };
            let target = i64::from(bounds.top).saturating_add(relative_offset);
            surface.set_scroll_top(offset_scroll_top(bounds.top, relative_offset));

            // Not enough content on one side to honour the offset
            let max = i64::from(surface.metrics().max_scroll_top());
            if target > max
                && state
                    .page_ordering
                    .last()
                    .is_some_and(|last| pages.can_load_page_after(last))
            {
                return Some(LoadRequest::new(Direction::After, Vec::new(), Some(follow_up)));
            }
            if target < 0
                && state
                    .page_ordering
                    .first()
                    .is_some_and(|first| pages.can_load_page_before(first))
            {
                return Some(LoadRequest::new(Direction::Before, Vec::new(), Some(follow_up)));
            }
            None
        }
        FollowUp::RestoreAnchor(anchor) => {
            let element = surface
                .rendered_messages()
                .iter()
                .find(|element| element.key.index == anchor.index && element.key.item == anchor.item)
                .map(|element| element.bounds);
            match element {
                Some(bounds) => surface.set_scroll_top(offset_scroll_top(bounds.top, anchor.offset)),
                None => debug!(
                    target: "pager.loader",
                    "anchor {} at {} was not rendered, leaving scroll position", anchor.item, anchor.index
                ),
            }
            None
        }
    }
}
