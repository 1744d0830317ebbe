use super::RenderSurface;
use crate::geometry::{Bounds, RenderedMessage, ScrollMetrics};
use crate::page_store::PageState;
use crate::types::{MessageKey, MessageRecord, PageKey};
use std::collections::HashMap;

/// How tall each kind of record is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightModel {
    /// Every record has the same height
    Uniform(u32),
    /// Content wraps at `chars_per_line`; markers get a fixed height
    Text {
        chars_per_line: u32,
        line_height: u32,
        padding: u32,
        marker_height: u32,
    },
}

impl Default for HeightModel {
    fn default() -> Self {
        HeightModel::Text {
            chars_per_line: 60,
            line_height: 18,
            padding: 12,
            marker_height: 28,
        }
    }
}

impl HeightModel {
    pub fn height_of(&self, record: &MessageRecord) -> u32 {
        match (self, record) {
            (HeightModel::Uniform(height), _) => *height,
            (
                HeightModel::Text {
                    chars_per_line,
                    line_height,
                    padding,
                    ..
                },
                MessageRecord::Content(message),
            ) => {
                let chars = u32::try_from(message.text.chars().count()).unwrap_or(u32::MAX);
                let lines = chars.div_ceil((*chars_per_line).max(1)).max(1);
                lines.saturating_mul(*line_height).saturating_add(*padding)
            }
            (HeightModel::Text { marker_height, .. }, _) => *marker_height,
        }
    }
}

/// Headless stand-in for a scroll container. Pages are stacked top to bottom
/// with zero-height sentinels at both ends of the content.
#[derive(Debug, Clone)]
pub struct SimulatedSurface {
    heights: HeightModel,
    client_height: u32,
    scroll_top: u32,
    total_content_height: u32,
    elements: Vec<RenderedMessage>,
    page_bounds: HashMap<PageKey, Bounds>,
}

impl SimulatedSurface {
    pub fn new(client_height: u32, heights: HeightModel) -> Self {
        Self {
            heights,
            client_height,
            scroll_top: 0,
            total_content_height: 0,
            elements: Vec::new(),
            page_bounds: HashMap::new(),
        }
    }

    fn clamp_scroll_top(&mut self) {
        let max = self.metrics().max_scroll_top();
        self.scroll_top = self.scroll_top.min(max);
    }
}

impl RenderSurface for SimulatedSurface {
    fn render(&mut self, state: &PageState) {
        self.elements.clear();
        self.page_bounds.clear();

        let mut cursor = 0u32;
        for page in state.iter_pages() {
            let page_start = cursor;
            for (index, item, record) in page.entries() {
                // Messages that vanished from the store are not rendered
                let Some(record) = record else {
                    continue;
                };
                let height = self.heights.height_of(record);
                self.elements.push(RenderedMessage {
                    key: MessageKey {
                        page: page.key,
                        item,
                        index,
                    },
                    bounds: Bounds::new(cursor, height),
                });
                cursor = cursor.saturating_add(height);
            }
            self.page_bounds
                .insert(page.key, Bounds::new(page_start, cursor - page_start));
        }

        self.total_content_height = cursor;
        self.clamp_scroll_top();
    }

    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics::new(
            self.scroll_top,
            self.total_content_height,
            self.client_height,
        )
    }

    fn set_scroll_top(&mut self, scroll_top: u32) {
        self.scroll_top = scroll_top;
        self.clamp_scroll_top();
    }

    fn rendered_messages(&self) -> &[RenderedMessage] {
        &self.elements
    }

    fn page_bounds(&self, key: &PageKey) -> Option<Bounds> {
        self.page_bounds.get(key).copied()
    }

    fn resize(&mut self, client_height: u32) {
        self.client_height = client_height;
        self.clamp_scroll_top();
    }
}
