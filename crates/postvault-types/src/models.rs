use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from a post's text.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Kind of media attached to a post. At most one kind is stored per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Opaque media reference in the `<kind>_<file_id>` form.
    pub fn reference(self, file_id: &str) -> String {
        format!("{}_{}", self.as_str(), file_id)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media reference together with its kind. Keeping both in one value
/// makes "kind is set iff reference is set" hold by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub reference: String,
}

/// Canonical, normalized form of one channel post.
///
/// Built once per inbound event and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub source_message_id: String,
    pub source_channel_id: String,
    pub message_text: String,
    pub media: Option<MediaAttachment>,
    pub posted_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub view_count: u64,
}

impl PostRecord {
    pub fn identity(&self) -> Identity<'_> {
        Identity {
            channel_id: &self.source_channel_id,
            message_id: &self.source_message_id,
        }
    }

    pub fn media_reference(&self) -> Option<&str> {
        self.media.as_ref().map(|m| m.reference.as_str())
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media.as_ref().map(|m| m.kind)
    }
}

/// The `(channel_id, message_id)` pair that uniquely names a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity<'a> {
    pub channel_id: &'a str,
    pub message_id: &'a str,
}

impl fmt::Display for Identity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Result of an insert-if-absent against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The uniqueness constraint rejected the row: another ingestion got there first.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    StoreUnavailable,
    StoreWrite,
}

/// Terminal outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestOutcome {
    Ingested,
    SkippedDuplicate,
    RejectedMalformed,
    Failed(FailureReason),
}

impl IngestOutcome {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::SkippedDuplicate => "skipped-duplicate",
            Self::RejectedMalformed => "rejected-malformed",
            Self::Failed(FailureReason::StoreUnavailable) => "failed-store-unavailable",
            Self::Failed(FailureReason::StoreWrite) => "failed-store-write",
        }
    }

    /// Failed outcomes are the only ones worth a redelivery from the transport.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One observability event per processed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub channel_id: String,
    pub message_id: String,
    pub outcome: IngestOutcome,
}
