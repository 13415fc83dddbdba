use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MediaKind;

// -- Status --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub total_posts: u64,
}

// -- Posts --

/// Stored post as returned by the read endpoint. Field names match the
/// persisted columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: i64,
    pub message: String,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    pub views: u64,
    pub telegram_message_id: String,
    pub telegram_channel_id: String,
    pub date_posted: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
