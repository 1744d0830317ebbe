//! Headless intersection observer: reports targets whose visibility relative to a
//! margin-expanded viewport crossed one of the configured thresholds.

use crate::geometry::{Bounds, ScrollMetrics};
use indexmap::IndexMap;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionConfig {
    /// Pixels added above and below the viewport
    pub root_margin: u32,
    pub thresholds: Vec<f64>,
}

impl IntersectionConfig {
    pub fn sentinel(margin: u32) -> Self {
        Self {
            root_margin: margin,
            thresholds: vec![0.0],
        }
    }

    pub fn unread(thresholds: Vec<f64>) -> Self {
        Self {
            root_margin: 0,
            thresholds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionEntry<T> {
    pub target: T,
    pub is_intersecting: bool,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Crossing {
    intersecting: bool,
    thresholds_passed: usize,
}

#[derive(Debug, Clone)]
pub struct VisibilityObserver<T> {
    config: IntersectionConfig,
    /// Last reported crossing per target; `None` until the first evaluation
    targets: IndexMap<T, Option<Crossing>>,
}

impl<T: Clone + Eq + Hash> VisibilityObserver<T> {
    pub fn new(config: IntersectionConfig) -> Self {
        Self {
            config,
            targets: IndexMap::new(),
        }
    }

    /// Start watching `target`. Already-watched targets keep their state.
    pub fn observe(&mut self, target: T) {
        self.targets.entry(target).or_insert(None);
    }

    pub fn unobserve(&mut self, target: &T) {
        self.targets.shift_remove(target);
    }

    /// Forget the last crossing so the next evaluation reports `target` again
    pub fn reobserve(&mut self, target: T) {
        self.targets.insert(target, None);
    }

    pub fn disconnect(&mut self) {
        self.targets.clear();
    }

    pub fn is_observing(&self, target: &T) -> bool {
        self.targets.contains_key(target)
    }

    pub fn observed(&self) -> impl Iterator<Item = &T> + '_ {
        self.targets.keys()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.targets.retain(|target, _| keep(target));
    }

    /// Compute entries for every target whose crossing changed since the last call.
    /// Targets without geometry are skipped and keep their state.
    pub fn evaluate<F>(&mut self, metrics: ScrollMetrics, bounds_of: F) -> Vec<IntersectionEntry<T>>
    where
        F: Fn(&T) -> Option<Bounds>,
    {
        let margin = self.config.root_margin;
        let window_top = metrics.scroll_top.saturating_sub(margin);
        let window_bottom = metrics.scroll_bottom().saturating_add(margin);

        let mut entries = Vec::new();
        for (target, last) in &mut self.targets {
            let Some(bounds) = bounds_of(target) else {
                continue;
            };
            let (intersecting, ratio) = intersection(bounds, window_top, window_bottom);
            let crossing = Crossing {
                intersecting,
                thresholds_passed: self
                    .config
                    .thresholds
                    .iter()
                    .filter(|threshold| ratio >= **threshold)
                    .count(),
            };
            if *last != Some(crossing) {
                *last = Some(crossing);
                entries.push(IntersectionEntry {
                    target: target.clone(),
                    is_intersecting: intersecting,
                    ratio,
                });
            }
        }
        entries
    }
}

/// Zero-height targets intersect when they lie within the window, edges included.
/// Others need a positive overlap.
fn intersection(bounds: Bounds, window_top: u32, window_bottom: u32) -> (bool, f64) {
    if bounds.height == 0 {
        let inside = bounds.top >= window_top && bounds.top <= window_bottom;
        return (inside, if inside { 1.0 } else { 0.0 });
    }
    let overlap = bounds.overlap_len(window_top, window_bottom);
    (overlap > 0, f64::from(overlap) / f64::from(bounds.height))
}

/// Zero-height markers above the first page and below the last one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    Top,
    Bottom,
}

impl Sentinel {
    pub fn bounds(self, metrics: ScrollMetrics) -> Bounds {
        match self {
            Sentinel::Top => Bounds::new(0, 0),
            Sentinel::Bottom => Bounds::new(metrics.scroll_height, 0),
        }
    }
}
