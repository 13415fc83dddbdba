/// Database row types. These map directly to SQLite rows and are kept
/// separate from the postvault-types records so the schema can drift
/// without touching the ingestion core.

pub struct PostRow {
    pub id: i64,
    pub message: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub views: i64,
    pub telegram_message_id: String,
    pub telegram_channel_id: String,
    pub date_posted: Option<String>,
    pub created_at: String,
}
