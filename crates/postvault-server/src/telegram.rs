//! Minimal Telegram Bot API client: just the calls the transport and the
//! operator commands need.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelegramError {
    /// Transport-level failure. The URL is stripped so the token never
    /// ends up in logs.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Bot API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base: String,
}

impl BotClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = self
            .http
            .post(format!("{}/{}", self.base, method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(TelegramError::Api {
                code: other.error_code,
                description: other
                    .description
                    .unwrap_or_else(|| format!("{} returned no result", method)),
            }),
        }
    }

    pub async fn get_me(&self) -> Result<BotUser, TelegramError> {
        self.call("getMe", json!({}), Duration::from_secs(15)).await
    }

    /// Long-poll for updates. The request timeout leaves headroom over the
    /// server-side poll timeout.
    ///
    /// Updates come back as raw JSON so one unexpected shape cannot fail
    /// the whole batch.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout: Duration,
    ) -> Result<Vec<serde_json::Value>, TelegramError> {
        let mut body = json!({
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["channel_post", "edited_channel_post", "message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body, poll_timeout + Duration::from_secs(10))
            .await
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text }),
                Duration::from_secs(15),
            )
            .await?;
        Ok(())
    }
}
