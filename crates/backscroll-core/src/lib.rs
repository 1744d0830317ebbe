//! Virtual pagination and scroll consistency for very long chat histories.
//!
//! Messages are fetched in fixed-size pages around the viewport, pages far from
//! it are evicted, and the on-screen position survives page loads, evictions
//! and arbitrary changes to the underlying sequence.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod follow_up;
pub mod geometry;
pub mod page_store;
pub mod policy;
pub mod reconcile;
pub mod store;
pub mod surface;
pub mod types;
pub mod unread;
pub mod visibility;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::PagerConfig;
pub use controller::{ChatController, IgnoreReason, ReconcileOutcome, ViewSnapshot};
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use page_store::{LoadOutcome, PageState};
pub use store::{InMemoryStore, MessageStore};
pub use surface::{HeightModel, RenderSurface, SimulatedSurface};
pub use types::{ChatId, ItemId, Message, MessageId, MessageRecord, PageKey};
