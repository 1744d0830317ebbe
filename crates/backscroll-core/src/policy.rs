//! Load and trim decisions taken when a sentinel comes into view

use crate::config::PagerConfig;
use crate::follow_up::FollowUp;
use crate::geometry::{ScrollMetrics, capture_anchor};
use crate::page_store::PageStore;
use crate::surface::RenderSurface;
use crate::types::{Direction, PageKey};
use tracing::debug;

/// A page load to dispatch, with the pages to drop from the far end and the
/// action to run once the result has been rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub direction: Direction,
    pub evict: Vec<PageKey>,
    pub follow_up: Option<FollowUp>,
}

impl LoadRequest {
    pub fn new(direction: Direction, evict: Vec<PageKey>, follow_up: Option<FollowUp>) -> Self {
        Self {
            direction,
            evict,
            follow_up,
        }
    }
}

/// Pages that can be dropped from the end opposite `growth`.
///
/// Walks from the far end accumulating page heights and takes a page only while
/// the remaining rendered height stays strictly above `buffer_viewports` viewports.
/// The page at the growth end is never a candidate. A page with unknown height
/// ends the walk.
pub fn pages_to_evict<F>(
    ordering: &[PageKey],
    growth: Direction,
    page_height: F,
    metrics: ScrollMetrics,
    buffer_viewports: u32,
) -> Vec<PageKey>
where
    F: Fn(&PageKey) -> Option<u32>,
{
    let Some(candidates) = ordering.len().checked_sub(1) else {
        return Vec::new();
    };
    let keep_above = u64::from(metrics.client_height) * u64::from(buffer_viewports);
    let mut remaining = u64::from(metrics.scroll_height);

    let far_end: Box<dyn Iterator<Item = &PageKey>> = match growth {
        Direction::Before => Box::new(ordering.iter().rev().take(candidates)),
        Direction::After => Box::new(ordering.iter().take(candidates)),
    };

    let mut evict = Vec::new();
    for key in far_end {
        let Some(height) = page_height(key) else {
            debug!(target: "pager.loader", "no geometry for page {}, stopping eviction scan", key);
            break;
        };
        let after = remaining.saturating_sub(u64::from(height));
        if after > keep_above {
            evict.push(*key);
            remaining = after;
        } else {
            break;
        }
    }
    evict
}

fn plan_sentinel_load(
    direction: Direction,
    pages: &PageStore,
    surface: &dyn RenderSurface,
    config: &PagerConfig,
) -> Option<LoadRequest> {
    if pages.is_loading() {
        debug!(target: "pager.loader", "{} sentinel visible but a load is in flight", direction);
        return None;
    }

    let state = pages.state();
    let edge = match direction {
        Direction::Before => state.page_ordering.first(),
        Direction::After => state.page_ordering.last(),
    }?;
    let can_load = match direction {
        Direction::Before => pages.can_load_page_before(edge),
        Direction::After => pages.can_load_page_after(edge),
    };
    if !can_load {
        debug!(target: "pager.loader", "cannot load {} {}", direction, edge);
        return None;
    }

    let evict = pages_to_evict(
        &state.page_ordering,
        direction,
        |key| surface.page_bounds(key).map(|bounds| bounds.height),
        surface.metrics(),
        config.eviction_buffer_viewports,
    );
    let follow_up = capture_anchor(surface).map(FollowUp::RestoreAnchor);

    debug!(
        target: "pager.loader",
        "planning load {} of {} evicting {} page(s)",
        direction,
        edge,
        evict.len()
    );
    Some(LoadRequest::new(direction, evict, follow_up))
}

/// Top sentinel in view: load the page before, trimming from the bottom
pub fn plan_top_load(
    pages: &PageStore,
    surface: &dyn RenderSurface,
    config: &PagerConfig,
) -> Option<LoadRequest> {
    plan_sentinel_load(Direction::Before, pages, surface, config)
}

/// Bottom sentinel in view: load the page after, trimming from the top
pub fn plan_bottom_load(
    pages: &PageStore,
    surface: &dyn RenderSurface,
    config: &PagerConfig,
) -> Option<LoadRequest> {
    plan_sentinel_load(Direction::After, pages, surface, config)
}

/// A message arrived while the view sits at the bottom with the tail loaded
pub fn plan_tail_append(
    pages: &PageStore,
    surface: &dyn RenderSurface,
    config: &PagerConfig,
) -> LoadRequest {
    let evict = pages_to_evict(
        &pages.state().page_ordering,
        Direction::After,
        |key| surface.page_bounds(key).map(|bounds| bounds.height),
        surface.metrics(),
        config.eviction_buffer_viewports,
    );
    LoadRequest::new(Direction::After, evict, Some(FollowUp::ScrollToBottomAndFill))
}
