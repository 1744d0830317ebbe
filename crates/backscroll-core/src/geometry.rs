//! Viewport probes: pure questions about the scroll container and the
//! elements rendered inside it.

use crate::page_store::PageState;
use crate::surface::RenderSurface;
use crate::types::{MessageKey, ViewportAnchor};

/// Scroll container measurements, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: u32,
    pub scroll_height: u32,
    pub client_height: u32,
}

impl ScrollMetrics {
    pub fn new(scroll_top: u32, scroll_height: u32, client_height: u32) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    pub fn max_scroll_top(&self) -> u32 {
        self.scroll_height.saturating_sub(self.client_height)
    }

    pub fn scroll_bottom(&self) -> u32 {
        self.scroll_top.saturating_add(self.client_height)
    }

    pub fn is_at_bottom(&self) -> bool {
        is_scrolled_to_bottom(self.scroll_top, self.scroll_height, self.client_height)
    }
}

/// Vertical extent of a rendered element, relative to the top of the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub top: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(top: u32, height: u32) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Overlap test with inclusive edges; an element spanning the whole window counts
    pub fn overlaps(&self, window_top: u32, window_bottom: u32) -> bool {
        let in_window = |value: u32| value >= window_top && value <= window_bottom;
        in_window(self.top)
            || in_window(self.bottom())
            || (self.top < window_top && self.bottom() > window_bottom)
    }

    /// Pixels of this element inside `[window_top, window_bottom]`
    pub fn overlap_len(&self, window_top: u32, window_bottom: u32) -> u32 {
        let start = self.top.max(window_top);
        let end = self.bottom().min(window_bottom);
        end.saturating_sub(start)
    }
}

/// A message element as laid out by the render surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedMessage {
    pub key: MessageKey,
    pub bounds: Bounds,
}

pub fn is_scrolled_to_bottom(scroll_top: u32, scroll_height: u32, viewport_height: u32) -> bool {
    scroll_top >= scroll_height.saturating_sub(viewport_height)
}

/// An element overlapping the viewport, as yielded by [`messages_in_view`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InView {
    pub key: MessageKey,
    pub top: u32,
    pub bottom: u32,
}

/// Lazy walk over the rendered elements that overlap the viewport, in document order
#[derive(Debug, Clone)]
pub struct MessagesInView<'a> {
    elements: std::slice::Iter<'a, RenderedMessage>,
    window_top: u32,
    window_bottom: u32,
}

impl<'a> MessagesInView<'a> {
    pub fn new(metrics: ScrollMetrics, elements: &'a [RenderedMessage]) -> Self {
        Self {
            elements: elements.iter(),
            window_top: metrics.scroll_top,
            window_bottom: metrics.scroll_bottom(),
        }
    }
}

impl Iterator for MessagesInView<'_> {
    type Item = InView;

    fn next(&mut self) -> Option<Self::Item> {
        let (window_top, window_bottom) = (self.window_top, self.window_bottom);
        self.elements
            .by_ref()
            .find(|element| element.bounds.overlaps(window_top, window_bottom))
            .map(|element| InView {
                key: element.key,
                top: element.bounds.top,
                bottom: element.bounds.bottom(),
            })
    }
}

/// Recomputed from the surface's current layout on every call
pub fn messages_in_view<S: RenderSurface + ?Sized>(surface: &S) -> MessagesInView<'_> {
    MessagesInView::new(surface.metrics(), surface.rendered_messages())
}

/// Anchor on the first element in view so a later render can put it back
/// at the same on-screen position.
pub fn capture_anchor<S: RenderSurface + ?Sized>(surface: &S) -> Option<ViewportAnchor> {
    let scroll_top = surface.metrics().scroll_top;
    messages_in_view(surface).next().map(|first| ViewportAnchor {
        item: first.key.item,
        index: first.key.index,
        offset: i64::from(scroll_top) - i64::from(first.top),
    })
}

/// Drives the "jump to latest" affordance
pub fn is_one_viewport_or_more_from_newest(state: &PageState, metrics: &ScrollMetrics) -> bool {
    let Some(newest_index) = state.message_ids.len().checked_sub(1) else {
        return false;
    };
    let Some(last_page) = state.last_page() else {
        return true;
    };

    // Not even the newest page is loaded
    if last_page.key.last_index != newest_index {
        return true;
    }

    let border = metrics
        .scroll_height
        .saturating_sub(metrics.client_height / 2);
    metrics.scroll_bottom() < border
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_store::Page;
    use crate::types::{ChatId, ItemId, MessageId, PageKey};
    use proptest::prelude::*;
    use rstest::rstest;

    fn rendered(heights: &[u32]) -> Vec<RenderedMessage> {
        let page = PageKey::new(ChatId(1), 0, heights.len().saturating_sub(1));
        let mut top = 0;
        heights
            .iter()
            .enumerate()
            .map(|(index, height)| {
                let element = RenderedMessage {
                    key: MessageKey {
                        page,
                        item: ItemId::Message(MessageId(index as u32 + 10)),
                        index,
                    },
                    bounds: Bounds::new(top, *height),
                };
                top += height;
                element
            })
            .collect()
    }

    #[rstest]
    #[case(900, 1500, 600, true)]
    #[case(899, 1500, 600, false)]
    #[case(0, 400, 600, true)]
    #[case(0, 600, 600, true)]
    #[case(0, 601, 600, false)]
    fn scrolled_to_bottom_cases(
        #[case] scroll_top: u32,
        #[case] scroll_height: u32,
        #[case] viewport: u32,
        #[case] expected: bool,
    ) {
        assert_eq!(
            is_scrolled_to_bottom(scroll_top, scroll_height, viewport),
            expected
        );
    }

    proptest! {
        #[test]
        fn prop_bottom_iff_at_max(
            viewport in 1u32..5_000,
            extra in 0u32..50_000,
            frac in 0.0f64..=1.0,
        ) {
            let scroll_height = viewport + extra;
            let max = scroll_height - viewport;
            let scroll_top = (f64::from(max) * frac) as u32;
            prop_assert_eq!(
                is_scrolled_to_bottom(scroll_top, scroll_height, viewport),
                scroll_top == max
            );
        }
    }

    #[test]
    fn in_view_includes_partially_visible_edges() {
        let elements = rendered(&[100, 100, 100, 100, 100]);
        let metrics = ScrollMetrics::new(150, 500, 200);

        let indices: Vec<_> = MessagesInView::new(metrics, &elements)
            .map(|m| m.key.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn in_view_includes_element_larger_than_viewport() {
        let elements = rendered(&[50, 1000, 50]);
        let metrics = ScrollMetrics::new(200, 1100, 300);

        let indices: Vec<_> = MessagesInView::new(metrics, &elements)
            .map(|m| m.key.index)
            .collect();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn in_view_is_restartable() {
        let elements = rendered(&[100, 100, 100]);
        let metrics = ScrollMetrics::new(0, 300, 100);
        let walk = MessagesInView::new(metrics, &elements);

        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.collect();
        assert_eq!(first, second);
    }

    fn state_with_pages(total: usize, loaded: &[(usize, usize)]) -> PageState {
        let chat_id = ChatId(1);
        let mut state = PageState::new(chat_id);
        state.message_ids = (0..total)
            .map(|i| ItemId::Message(MessageId(i as u32 + 10)))
            .collect();
        for (first, last) in loaded {
            let key = PageKey::new(chat_id, *first, *last);
            let items = state.message_ids[*first..=*last].to_vec();
            state.page_ordering.push(key);
            state.pages.insert(key, Page::new(key, items, Vec::new()));
        }
        state
    }

    #[test]
    fn far_from_newest_when_tail_page_not_loaded() {
        let state = state_with_pages(100, &[(0, 29)]);
        let metrics = ScrollMetrics::new(10_000, 10_000, 500);
        assert!(is_one_viewport_or_more_from_newest(&state, &metrics));
    }

    #[test]
    fn near_newest_when_within_half_a_viewport() {
        let state = state_with_pages(100, &[(70, 99)]);
        // scroll_bottom = 2600 >= 3000 - 400
        let metrics = ScrollMetrics::new(1800, 3000, 800);
        assert!(!is_one_viewport_or_more_from_newest(&state, &metrics));

        let metrics = ScrollMetrics::new(1700, 3000, 800);
        assert!(is_one_viewport_or_more_from_newest(&state, &metrics));
    }
}
