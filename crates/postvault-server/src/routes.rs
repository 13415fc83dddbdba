use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, warn};

use postvault_db::Database;
use postvault_db::models::PostRow;
use postvault_ingest::Coordinator;
use postvault_types::api::{PostResponse, StatusResponse};
use postvault_types::events::Update;
use postvault_types::models::MediaKind;

use crate::commands;
use crate::config::Transport;
use crate::telegram::BotClient;

/// Header Telegram echoes back when a webhook is registered with a secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub db: Arc<Database>,
    pub bot: Option<BotClient>,
    pub webhook_secret: Option<String>,
}

pub fn router(state: AppState, transport: Transport) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/posts", get(recent_posts));

    if transport == Transport::Webhook {
        router = router.route("/telegram/webhook", post(webhook));
    }

    router.with_state(state)
}

async fn index() -> &'static str {
    "postvault: channel archive is running"
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let total_posts = state.coordinator.stored_count().await.map_err(|e| {
        error!(error = %e, "Status query failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(StatusResponse { total_posts }))
}

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

async fn recent_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run the blocking query off the async runtime
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.recent_posts(query.limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!(error = %e, "Recent posts query failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let posts: Vec<PostResponse> = rows.into_iter().map(post_response).collect();
    Ok(Json(posts))
}

/// Telegram webhook. Anything that should not be redelivered answers 200;
/// a failed ingestion answers 500 so Telegram tries again later.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(secret.as_str()) {
            warn!("Webhook call with missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable webhook body");
            return StatusCode::OK;
        }
    };

    if let (Some(bot), Some(message)) = (&state.bot, &update.message) {
        commands::handle_message(bot, &state.coordinator, message).await;
    }

    if state.coordinator.submit(update).await.needs_redelivery() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

fn post_response(row: PostRow) -> PostResponse {
    let media_type = row.media_type.as_deref().and_then(|t| {
        MediaKind::parse(t).or_else(|| {
            warn!("Unknown media_type '{}' on post {}", t, row.id);
            None
        })
    });

    PostResponse {
        id: row.id,
        media_type,
        views: u64::try_from(row.views).unwrap_or(0),
        date_posted: row.date_posted.as_deref().and_then(|s| parse_timestamp(s, row.id)),
        created_at: parse_timestamp(&row.created_at, row.id).unwrap_or_default(),
        message: row.message,
        media_url: row.media_url,
        telegram_message_id: row.telegram_message_id,
        telegram_channel_id: row.telegram_channel_id,
    }
}

fn parse_timestamp(raw: &str, post_id: i64) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat as UTC
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| warn!("Corrupt timestamp '{}' on post {}: {}", raw, post_id, e))
        .ok()
}
