use crate::Database;
use crate::models::PostRow;
use anyhow::Result;
use chrono::SecondsFormat;
use postvault_types::models::{InsertOutcome, PostRecord};
use rusqlite::{Connection, ErrorCode};
use tracing::debug;

/// Upper bound on rows returned by [`Database::recent_posts`].
pub const MAX_RECENT_POSTS: u32 = 200;

const POST_COLUMNS: &str = "id, message, media_url, media_type, views, telegram_message_id, \
                            telegram_channel_id, date_posted, created_at";

impl Database {
    // -- Identity --

    pub fn exists_by_identity(&self, channel_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM telegram_channel_posts
                    WHERE telegram_channel_id = ?1 AND telegram_message_id = ?2
                 )",
                [channel_id, message_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    // -- Writes --

    /// Insert a post. A uniqueness violation on the identity pair is not an
    /// error: it means the row is already there.
    pub fn insert_post(&self, record: &PostRecord) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO telegram_channel_posts
                    (message, media_url, media_type, views, telegram_message_id,
                     telegram_channel_id, date_posted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    record.message_text,
                    record.media_reference(),
                    record.media_kind().map(|k| k.as_str()),
                    i64::try_from(record.view_count).unwrap_or(i64::MAX),
                    record.source_message_id,
                    record.source_channel_id,
                    record
                        .posted_at
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    record
                        .ingested_at
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                ],
            );

            match result {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_unique_violation(&e) => {
                    debug!(
                        channel_id = %record.source_channel_id,
                        message_id = %record.source_message_id,
                        "Insert hit unique constraint"
                    );
                    Ok(InsertOutcome::AlreadyExists)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    // -- Reads --

    pub fn count_posts(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM telegram_channel_posts", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    pub fn get_post(&self, channel_id: &str, message_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, channel_id, message_id))
    }

    /// Newest posts first. `limit` is capped at [`MAX_RECENT_POSTS`].
    pub fn recent_posts(&self, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_recent(conn, limit.min(MAX_RECENT_POSTS)))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        message: row.get(1)?,
        media_url: row.get(2)?,
        media_type: row.get(3)?,
        views: row.get(4)?,
        telegram_message_id: row.get(5)?,
        telegram_channel_id: row.get(6)?,
        date_posted: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_post(conn: &Connection, channel_id: &str, message_id: &str) -> Result<Option<PostRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM telegram_channel_posts
         WHERE telegram_channel_id = ?1 AND telegram_message_id = ?2"
    ))?;

    let row = stmt.query_row([channel_id, message_id], map_post).optional()?;
    Ok(row)
}

fn query_recent(conn: &Connection, limit: u32) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM telegram_channel_posts
         ORDER BY created_at DESC, id DESC
         LIMIT ?1"
    ))?;

    let rows = stmt
        .query_map([limit], map_post)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
