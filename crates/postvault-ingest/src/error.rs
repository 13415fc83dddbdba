//! Error taxonomy for the ingestion pipeline.

use postvault_types::models::FailureReason;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that end one delivery attempt. None of them are fatal to the
/// process; the coordinator turns each into an outcome and moves on.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The event has no usable content or identity. Dropped, never retried.
    #[error("Malformed event: {0}")]
    Malformed(String),

    /// The existence check could not be completed. This is not "not found".
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// The insert failed for a reason other than the uniqueness constraint.
    #[error("Store write failed: {0}")]
    StoreWrite(#[source] anyhow::Error),
}

impl IngestError {
    /// Failure reason for store errors, `None` for malformed events.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Malformed(_) => None,
            Self::StoreUnavailable(_) => Some(FailureReason::StoreUnavailable),
            Self::StoreWrite(_) => Some(FailureReason::StoreWrite),
        }
    }
}
