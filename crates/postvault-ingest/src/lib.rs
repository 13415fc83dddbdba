//! Ingestion and deduplication of channel posts.
//!
//! ```text
//! transport → Coordinator → normalize → DuplicateClassifier → IdempotentWriter → store
//!                  ↓
//!             OutcomeSink
//! ```
//!
//! Delivery from the transport is at-least-once. Each post is looked up by
//! its `(channel_id, message_id)` pair before it is written, and the
//! store's uniqueness constraint catches the case where two deliveries of
//! the same post race past the lookup. Either way the post is stored once
//! and the losing attempt is reported as a skipped duplicate.
//!
//! Nothing here retries. A failed attempt is terminal for that delivery;
//! the transport's redelivery is what eventually stores the post.

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod normalize;
pub mod sink;
pub mod store;
pub mod writer;

pub use classify::{Classification, DuplicateClassifier};
pub use coordinator::{Coordinator, CoordinatorConfig, Disposition};
pub use error::{IngestError, Result};
pub use normalize::{normalize, normalize_at};
pub use sink::{OutcomeSink, TracingSink};
pub use store::PostStore;
pub use writer::IdempotentWriter;
