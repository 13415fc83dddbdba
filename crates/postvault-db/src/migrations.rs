use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (telegram_channel_posts)");
        conn.execute_batch(
            "
            CREATE TABLE telegram_channel_posts (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                message              TEXT NOT NULL CHECK (length(message) <= 5000),
                media_url            TEXT,
                media_type           TEXT CHECK (media_type IN ('photo', 'video', 'document')),
                views                INTEGER NOT NULL DEFAULT 0,
                telegram_message_id  TEXT NOT NULL,
                telegram_channel_id  TEXT NOT NULL,
                date_posted          TEXT,
                created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CONSTRAINT unique_telegram_post UNIQUE (telegram_message_id, telegram_channel_id),
                CHECK ((media_url IS NULL) = (media_type IS NULL))
            );

            CREATE INDEX idx_posts_created
                ON telegram_channel_posts(created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
