use std::sync::Arc;

use postvault_types::models::PostRecord;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::store::PostStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Exists,
    NotFound,
}

/// Existence check keyed on the identity pair.
///
/// Delivery is at-least-once, so every write is preceded by this check. It
/// is not atomic with the write; see [`crate::writer::IdempotentWriter`]
/// for the backstop.
#[derive(Clone)]
pub struct DuplicateClassifier {
    store: Arc<dyn PostStore>,
}

impl DuplicateClassifier {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    /// A failed query is [`IngestError::StoreUnavailable`], never `NotFound`.
    pub async fn classify(&self, record: &PostRecord) -> Result<Classification> {
        let store = self.store.clone();
        let channel_id = record.source_channel_id.clone();
        let message_id = record.source_message_id.clone();

        // Run the blocking lookup off the async runtime
        let exists = tokio::task::spawn_blocking(move || {
            store.exists_by_identity(&channel_id, &message_id)
        })
        .await
        .map_err(|e| IngestError::StoreUnavailable(anyhow::anyhow!("lookup task failed: {}", e)))?
        .map_err(IngestError::StoreUnavailable)?;

        let classification = if exists {
            Classification::Exists
        } else {
            Classification::NotFound
        };
        debug!(identity = %record.identity(), ?classification, "Classified post");
        Ok(classification)
    }
}
