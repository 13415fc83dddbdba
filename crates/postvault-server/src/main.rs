mod commands;
mod config;
mod poller;
mod routes;
mod telegram;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use postvault_db::Database;
use postvault_ingest::{Coordinator, CoordinatorConfig, TracingSink};

use crate::config::{Config, Transport};
use crate::routes::AppState;
use crate::telegram::BotClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "postvault=debug,postvault_ingest=debug,postvault_db=info,tower_http=info".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Bot client; an unusable token is fatal at startup
    let bot = match &config.bot_token {
        Some(token) => {
            let bot = BotClient::new(&config.api_url, token)?;
            let me = bot.get_me().await.context("Telegram rejected the bot token")?;
            info!(
                "Bot @{} (id {}) ready. Add it as an admin of the channel to archive.",
                me.username.as_deref().unwrap_or("?"),
                me.id
            );
            Some(bot)
        }
        None => None,
    };

    let coordinator = Coordinator::new(
        db.clone(),
        Arc::new(TracingSink),
        CoordinatorConfig {
            allowed_channel_id: config.allowed_channel_id.clone(),
            max_in_flight: config.max_in_flight,
        },
    );
    if let Some(channel) = &config.allowed_channel_id {
        info!("Only archiving posts from channel {}", channel);
    }

    let shutdown = CancellationToken::new();

    let poller = match (config.transport, &bot) {
        (Transport::Polling, Some(bot)) => Some(tokio::spawn(poller::run_poll_loop(
            bot.clone(),
            coordinator.clone(),
            config.poll_timeout,
            shutdown.clone(),
        ))),
        _ => None,
    };

    let state = AppState {
        coordinator: coordinator.clone(),
        db,
        bot,
        webhook_secret: config.webhook_secret.clone(),
    };
    let app = routes::router(state, config.transport).layer(TraceLayer::new_for_http());

    info!("postvault listening on {} ({:?} transport)", config.addr, config.transport);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal.cancel();
        })
        .await?;

    // Transport first, then let in-flight posts finish writing
    shutdown.cancel();
    if let Some(poller) = poller {
        let _ = poller.await;
    }
    coordinator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
