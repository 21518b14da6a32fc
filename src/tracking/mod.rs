//! Build artifact tracking: the in-memory ledger, its wire model, and
//! the HTTP surface that feeds and drains it.

pub mod api;
pub mod model;
pub mod store;

pub use model::{TrackedContent, TrackedContentEntry, TrackingKey};
pub use store::{SealedEvent, TrackingStore};
