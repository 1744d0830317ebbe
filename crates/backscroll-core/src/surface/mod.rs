//! The rendering collaborator: turns pages into laid-out elements and reports geometry

mod simulated;

pub use simulated::{HeightModel, SimulatedSurface};

use crate::geometry::{Bounds, RenderedMessage, ScrollMetrics};
use crate::page_store::PageState;
use crate::types::PageKey;
use std::fmt::Debug;

pub trait RenderSurface: Send + Debug {
    /// Lay out the loaded pages. The numeric scroll top is kept (clamped to the
    /// new content height); anchoring is the caller's job.
    fn render(&mut self, state: &PageState);

    fn metrics(&self) -> ScrollMetrics;

    /// Clamped to `[0, max_scroll_top]`
    fn set_scroll_top(&mut self, scroll_top: u32);

    /// Rendered message elements in document order
    fn rendered_messages(&self) -> &[RenderedMessage];

    fn page_bounds(&self, key: &PageKey) -> Option<Bounds>;

    fn resize(&mut self, client_height: u32);

    fn element_bounds(&self, index: usize) -> Option<Bounds> {
        self.rendered_messages()
            .iter()
            .find(|element| element.key.index == index)
            .map(|element| element.bounds)
    }

    fn scroll_to_bottom(&mut self) {
        let max = self.metrics().max_scroll_top();
        self.set_scroll_top(max);
    }
}
