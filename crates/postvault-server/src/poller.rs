use std::time::Duration;

use postvault_ingest::{Coordinator, Disposition};
use postvault_types::events::{IncomingMessage, Update};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands;
use crate::telegram::BotClient;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Long-poll loop feeding the coordinator.
///
/// The offset only moves past a batch once nothing in it needs
/// redelivery. When a post fails, the offset stays on it and Telegram
/// hands the batch back on the next poll; posts that did get stored are
/// then skipped as duplicates.
pub async fn run_poll_loop(
    bot: BotClient,
    coordinator: Coordinator,
    poll_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut cursor = PollCursor::default();
    let mut backoff = INITIAL_BACKOFF;

    info!(timeout_secs = poll_timeout.as_secs(), "Polling for channel posts");

    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = bot.get_updates(cursor.offset, poll_timeout) => result,
        };

        let raw = match batch {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "getUpdates failed");
                if sleep_or_cancel(backoff, &shutdown).await {
                    break;
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        if raw.is_empty() {
            backoff = INITIAL_BACKOFF;
            continue;
        }

        let step = cursor.process(&coordinator, raw).await;
        for message in &step.commands {
            commands::handle_message(&bot, &coordinator, message).await;
        }

        if step.held_back {
            warn!(offset = ?cursor.offset, retry_in = ?backoff, "Batch had failures, waiting for redelivery");
            if sleep_or_cancel(backoff, &shutdown).await {
                break;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        } else {
            backoff = INITIAL_BACKOFF;
        }
    }

    info!("Poll loop stopped");
}

/// Where the poll loop stands between `getUpdates` calls.
#[derive(Debug, Default)]
struct PollCursor {
    offset: Option<i64>,
    /// Highest update id whose command has been answered. A held-back
    /// batch comes back whole, and its commands must not be answered twice.
    answered_up_to: Option<i64>,
}

/// Result of one batch.
#[derive(Debug)]
struct BatchStep {
    /// Direct messages not answered on an earlier poll.
    commands: Vec<IncomingMessage>,
    /// The offset stayed on a failed update.
    held_back: bool,
}

impl PollCursor {
    async fn process(&mut self, coordinator: &Coordinator, raw: Vec<serde_json::Value>) -> BatchStep {
        let (updates, max_seen) = decode_batch(raw);
        debug!(count = updates.len(), ?max_seen, "Received updates");

        let commands = updates
            .iter()
            .filter(|u| !self.answered_up_to.is_some_and(|id| u.update_id <= id))
            .filter_map(|u| u.message.clone())
            .collect();
        self.answered_up_to = max_seen.max(self.answered_up_to);

        let results = coordinator.ingest_batch(updates).await;
        let next = next_offset(self.offset, max_seen, &results);
        self.offset = next;

        BatchStep {
            commands,
            held_back: matches!((next, max_seen), (Some(n), Some(m)) if n <= m),
        }
    }
}

/// Decode raw updates, dropping any that do not parse. Returns the decoded
/// updates and the highest update id seen, decodable or not.
fn decode_batch(raw: Vec<serde_json::Value>) -> (Vec<Update>, Option<i64>) {
    let mut max_seen = None;
    let mut updates = Vec::with_capacity(raw.len());

    for value in raw {
        let update_id = value.get("update_id").and_then(serde_json::Value::as_i64);
        max_seen = max_seen.max(update_id);

        match serde_json::from_value::<Update>(value) {
            Ok(update) => updates.push(update),
            Err(e) => warn!(?update_id, error = %e, "Skipping undecodable update"),
        }
    }

    (updates, max_seen)
}

/// Offset for the next `getUpdates` call: the first update that needs
/// redelivery, else one past the highest id seen.
fn next_offset(
    current: Option<i64>,
    max_seen: Option<i64>,
    results: &[(i64, Disposition)],
) -> Option<i64> {
    let first_failed = results
        .iter()
        .filter(|(_, d)| d.needs_redelivery())
        .map(|(id, _)| *id)
        .min();

    match (first_failed, max_seen) {
        (Some(failed), _) => Some(failed),
        (None, Some(max)) => Some(max + 1),
        (None, None) => current,
    }
}

/// Returns `true` if shutdown was requested while waiting.
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
