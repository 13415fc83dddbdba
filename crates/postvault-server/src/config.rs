use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// How channel posts reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Long-poll `getUpdates`.
    Polling,
    /// Telegram POSTs updates to `/telegram/webhook`.
    Webhook,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub bot_token: Option<String>,
    pub api_url: String,
    pub allowed_channel_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub poll_timeout: Duration,
    pub max_in_flight: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let transport = match get("POSTVAULT_TRANSPORT").as_deref() {
            None | Some("polling") => Transport::Polling,
            Some("webhook") => Transport::Webhook,
            Some(other) => bail!("POSTVAULT_TRANSPORT must be 'polling' or 'webhook', got '{}'", other),
        };

        let bot_token = get("TELEGRAM_BOT_TOKEN");
        if transport == Transport::Polling && bot_token.is_none() {
            bail!("TELEGRAM_BOT_TOKEN is required for polling transport");
        }

        let host = get("POSTVAULT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        let poll_timeout_secs: u64 = match get("POSTVAULT_POLL_TIMEOUT_SECS") {
            Some(v) => v.parse().context("POSTVAULT_POLL_TIMEOUT_SECS must be an integer")?,
            None => 30,
        };
        let max_in_flight: usize = match get("POSTVAULT_MAX_IN_FLIGHT") {
            Some(v) => v.parse().context("POSTVAULT_MAX_IN_FLIGHT must be an integer")?,
            None => 16,
        };

        Ok(Self {
            transport,
            bot_token,
            api_url: get("TELEGRAM_API_URL").unwrap_or_else(|| "https://api.telegram.org".into()),
            allowed_channel_id: get("TELEGRAM_CHANNEL_ID"),
            webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            db_path: get("POSTVAULT_DB_PATH").unwrap_or_else(|| "postvault.db".into()).into(),
            addr,
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            max_in_flight: max_in_flight.max(1),
        })
    }
}
