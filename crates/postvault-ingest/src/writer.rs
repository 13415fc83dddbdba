use std::sync::Arc;

use postvault_types::models::{InsertOutcome, PostRecord};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::store::PostStore;

/// Insert-if-absent against the store.
///
/// Classification and write are two separate store calls, so two
/// concurrent deliveries of the same post can both classify as not found.
/// Whichever insert lands second hits the uniqueness constraint and is
/// reported as [`InsertOutcome::AlreadyExists`].
#[derive(Clone)]
pub struct IdempotentWriter {
    store: Arc<dyn PostStore>,
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    pub async fn write(&self, record: PostRecord) -> Result<InsertOutcome> {
        let store = self.store.clone();

        // A single-row insert is atomic in the store, so a dropped caller
        // can never leave a partial row behind. The blocking task itself
        // runs to completion regardless.
        let (outcome, record) = tokio::task::spawn_blocking(move || {
            let outcome = store.insert_if_absent(&record);
            (outcome, record)
        })
        .await
        .map_err(|e| IngestError::StoreWrite(anyhow::anyhow!("insert task failed: {}", e)))?;

        let outcome = outcome.map_err(IngestError::StoreWrite)?;
        match outcome {
            InsertOutcome::Inserted => {
                info!(identity = %record.identity(), media = ?record.media_kind(), "Post stored");
            }
            InsertOutcome::AlreadyExists => {
                debug!(identity = %record.identity(), "Lost insert race, post already stored");
            }
        }
        Ok(outcome)
    }
}
