//! Record normalizer: raw channel post in, canonical [`PostRecord`] out.
//!
//! Pure transformation. Nothing here touches the store or blocks.

use chrono::{DateTime, Utc};
use postvault_types::events::ChannelPost;
use postvault_types::models::{MAX_MESSAGE_CHARS, MediaAttachment, MediaKind, PostRecord};

use crate::error::{IngestError, Result};

/// Normalize a post, stamping it with the current wall-clock time.
pub fn normalize(post: &ChannelPost) -> Result<PostRecord> {
    normalize_at(post, Utc::now())
}

/// Normalize a post with an explicit ingestion time.
pub fn normalize_at(post: &ChannelPost, ingested_at: DateTime<Utc>) -> Result<PostRecord> {
    if post.message_id.is_empty() || post.chat.id.is_empty() {
        return Err(IngestError::Malformed(format!(
            "missing identity (channel={:?}, message={:?})",
            post.chat.id, post.message_id
        )));
    }

    let text = select_text(post);
    let media = select_media(post);

    if text.is_empty() && media.is_none() {
        return Err(IngestError::Malformed(format!(
            "post {}/{} has no text, caption or supported media",
            post.chat.id, post.message_id
        )));
    }

    Ok(PostRecord {
        source_message_id: post.message_id.clone(),
        source_channel_id: post.chat.id.clone(),
        message_text: truncate_chars(text, MAX_MESSAGE_CHARS),
        media,
        posted_at: post.date.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        ingested_at,
        view_count: parse_views(post.views.as_ref()),
    })
}

/// `text`, else `caption`, else empty. An empty string counts as absent.
fn select_text(post: &ChannelPost) -> &str {
    [post.text.as_deref(), post.caption.as_deref()]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

/// Photo beats video beats document. For photos the last listed size is
/// the largest one.
fn select_media(post: &ChannelPost) -> Option<MediaAttachment> {
    let (kind, file_id) = if let Some(largest) = post.photo.as_ref().and_then(|sizes| sizes.last()) {
        (MediaKind::Photo, largest.file_id.as_str())
    } else if let Some(video) = &post.video {
        (MediaKind::Video, video.file_id.as_str())
    } else if let Some(document) = &post.document {
        (MediaKind::Document, document.file_id.as_str())
    } else {
        return None;
    };

    Some(MediaAttachment {
        kind,
        reference: kind.reference(file_id),
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Non-negative integer, or a string holding one. Anything else is 0.
fn parse_views(raw: Option<&serde_json::Value>) -> u64 {
    match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
