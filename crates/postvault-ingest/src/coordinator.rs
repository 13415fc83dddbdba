use std::sync::Arc;

use postvault_types::events::{ChannelPost, Update};
use postvault_types::models::{InsertOutcome, IngestOutcome, IngestReport};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::classify::{Classification, DuplicateClassifier};
use crate::error::{IngestError, Result};
use crate::normalize::normalize;
use crate::sink::OutcomeSink;
use crate::store::PostStore;
use crate::writer::IdempotentWriter;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// When set, posts from any other channel are ignored.
    pub allowed_channel_id: Option<String>,
    /// Upper bound on posts being processed at once.
    pub max_in_flight: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            allowed_channel_id: None,
            max_in_flight: 16,
        }
    }
}

/// What happened to one submitted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A channel post went through the pipeline.
    Processed(IngestOutcome),
    /// Not a channel post we ingest (edit, direct message, other channel).
    Ignored,
    /// Never ran: the coordinator was shutting down or the task died.
    NotAccepted,
}

impl Disposition {
    /// Whether the transport should deliver this update again.
    pub fn needs_redelivery(self) -> bool {
        match self {
            Self::Processed(outcome) => outcome.is_failed(),
            Self::Ignored => false,
            Self::NotAccepted => true,
        }
    }
}

/// Drives normalizer, classifier and writer for each inbound update.
///
/// Cheap to clone; all clones share the same store, sink and task tracker.
/// Updates are independent: each runs on its own task and no state is
/// shared between them apart from the store.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: Arc<dyn PostStore>,
    classifier: DuplicateClassifier,
    writer: IdempotentWriter,
    sink: Arc<dyn OutcomeSink>,
    config: CoordinatorConfig,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn PostStore>,
        sink: Arc<dyn OutcomeSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            inner: Arc::new(CoordinatorInner {
                classifier: DuplicateClassifier::new(store.clone()),
                writer: IdempotentWriter::new(store.clone()),
                store,
                sink,
                config,
                permits,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Run one channel post through the pipeline and report the outcome.
    ///
    /// Never returns an error: every failure becomes a terminal outcome
    /// for this delivery attempt.
    pub async fn ingest(&self, post: &ChannelPost) -> IngestOutcome {
        let outcome = match self.process(post).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    IngestError::Malformed(reason) => debug!(%reason, "Rejected channel post"),
                    other => warn!(error = %other, "Channel post ingestion failed"),
                }
                match e.failure_reason() {
                    Some(reason) => IngestOutcome::Failed(reason),
                    None => IngestOutcome::RejectedMalformed,
                }
            }
        };

        self.inner.sink.report(&IngestReport {
            channel_id: post.chat.id.clone(),
            message_id: post.message_id.clone(),
            outcome,
        });
        outcome
    }

    async fn process(&self, post: &ChannelPost) -> Result<IngestOutcome> {
        let record = normalize(post)?;

        match self.inner.classifier.classify(&record).await? {
            Classification::Exists => Ok(IngestOutcome::SkippedDuplicate),
            Classification::NotFound => match self.inner.writer.write(record).await? {
                InsertOutcome::Inserted => Ok(IngestOutcome::Ingested),
                InsertOutcome::AlreadyExists => Ok(IngestOutcome::SkippedDuplicate),
            },
        }
    }

    /// Filter an update down to the channel posts we ingest, then ingest.
    pub async fn handle_update(&self, update: &Update) -> Disposition {
        if update.edited_channel_post.is_some() {
            debug!(update_id = update.update_id, "Ignoring edited channel post");
            return Disposition::Ignored;
        }

        let Some(post) = &update.channel_post else {
            debug!(update_id = update.update_id, "Ignoring non-channel update");
            return Disposition::Ignored;
        };

        if let Some(allowed) = &self.inner.config.allowed_channel_id {
            if post.chat.id != *allowed {
                debug!(
                    update_id = update.update_id,
                    channel_id = %post.chat.id,
                    "Ignoring post from unlisted channel"
                );
                return Disposition::Ignored;
            }
        }

        Disposition::Processed(self.ingest(post).await)
    }

    /// Start processing an update on a tracked task. Returns `None` once
    /// [`Coordinator::shutdown`] has been called.
    ///
    /// The task runs to completion even if the returned handle is dropped.
    pub fn spawn(&self, update: Update) -> Option<JoinHandle<Disposition>> {
        // The token counts as in flight from here, so a shutdown that
        // closes the tracker after the check below still waits for it.
        let token = self.inner.tracker.token();
        if self.inner.tracker.is_closed() {
            warn!(update_id = update.update_id, "Shutting down, update not accepted");
            return None;
        }

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _token = token;
            let Ok(_permit) = this.inner.permits.clone().acquire_owned().await else {
                return Disposition::NotAccepted;
            };
            this.handle_update(&update).await
        }))
    }

    /// Spawn and wait for one update.
    pub async fn submit(&self, update: Update) -> Disposition {
        match self.spawn(update) {
            Some(handle) => join(handle).await,
            None => Disposition::NotAccepted,
        }
    }

    /// Process a batch concurrently. Results are in input order, paired
    /// with each update's id.
    pub async fn ingest_batch(&self, updates: Vec<Update>) -> Vec<(i64, Disposition)> {
        let handles: Vec<_> = updates
            .into_iter()
            .map(|u| (u.update_id, self.spawn(u)))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (update_id, handle) in handles {
            let disposition = match handle {
                Some(handle) => join(handle).await,
                None => Disposition::NotAccepted,
            };
            results.push((update_id, disposition));
        }
        results
    }

    /// Total stored posts, for the operator status query.
    pub async fn stored_count(&self) -> Result<u64> {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.count_posts())
            .await
            .map_err(|e| IngestError::StoreUnavailable(anyhow::anyhow!("count task failed: {}", e)))?
            .map_err(IngestError::StoreUnavailable)
    }

    /// Stop accepting updates and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.inner.tracker.close();
        let in_flight = self.inner.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight ingestion to finish");
        }
        self.inner.tracker.wait().await;
        info!("Ingestion coordinator stopped");
    }
}

async fn join(handle: JoinHandle<Disposition>) -> Disposition {
    match handle.await {
        Ok(disposition) => disposition,
        Err(e) => {
            error!(error = %e, "Ingestion task failed");
            Disposition::NotAccepted
        }
    }
}
