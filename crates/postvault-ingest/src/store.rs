use anyhow::Result;
use postvault_db::Database;
use postvault_types::models::{InsertOutcome, PostRecord};

/// The store operations the pipeline needs.
///
/// Calls are blocking; the classifier and writer run them on the blocking
/// pool. Implementations must tolerate concurrent callers and must enforce
/// uniqueness of `(channel_id, message_id)` themselves, reporting a
/// violation as [`InsertOutcome::AlreadyExists`].
pub trait PostStore: Send + Sync + 'static {
    fn exists_by_identity(&self, channel_id: &str, message_id: &str) -> Result<bool>;

    fn insert_if_absent(&self, record: &PostRecord) -> Result<InsertOutcome>;

    fn count_posts(&self) -> Result<u64>;
}

impl PostStore for Database {
    fn exists_by_identity(&self, channel_id: &str, message_id: &str) -> Result<bool> {
        Database::exists_by_identity(self, channel_id, message_id)
    }

    fn insert_if_absent(&self, record: &PostRecord) -> Result<InsertOutcome> {
        self.insert_post(record)
    }

    fn count_posts(&self) -> Result<u64> {
        Database::count_posts(self)
    }
}
