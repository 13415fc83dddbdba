use postvault_types::models::{IngestOutcome, IngestReport};
use tracing::{info, warn};

/// Receives one report per processed channel post.
///
/// Called on the ingestion task; implementations should not block.
pub trait OutcomeSink: Send + Sync + 'static {
    fn report(&self, report: &IngestReport);
}

/// Writes every report to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn report(&self, report: &IngestReport) {
        match report.outcome {
            IngestOutcome::Ingested | IngestOutcome::SkippedDuplicate => info!(
                channel_id = %report.channel_id,
                message_id = %report.message_id,
                outcome = %report.outcome,
                "Channel post processed"
            ),
            IngestOutcome::RejectedMalformed | IngestOutcome::Failed(_) => warn!(
                channel_id = %report.channel_id,
                message_id = %report.message_id,
                outcome = %report.outcome,
                "Channel post not stored"
            ),
        }
    }
}
