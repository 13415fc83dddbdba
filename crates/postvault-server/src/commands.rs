use postvault_ingest::Coordinator;
use postvault_types::events::IncomingMessage;
use tracing::{info, warn};

use crate::telegram::BotClient;

/// Operator commands sent to the bot in a direct message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
}

impl Command {
    /// Parse `/status` or `/status@my_bot` style text. Anything else is not
    /// a command we answer.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" | "help" => Some(Self::Start),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Answer a command if the message carries one. Failures are logged and
/// swallowed: commands never affect ingestion.
pub async fn handle_message(bot: &BotClient, coordinator: &Coordinator, message: &IncomingMessage) {
    let Some(command) = message.text.as_deref().and_then(Command::parse) else {
        return;
    };

    let reply = match command {
        Command::Start => {
            "Add me as an admin of your channel and every post will be archived. \
             Send /status for the number of stored posts."
                .to_string()
        }
        Command::Status => match coordinator.stored_count().await {
            Ok(count) => format!("Total posts stored: {}", count),
            Err(e) => {
                warn!(error = %e, "Status query failed");
                "Status is unavailable right now.".to_string()
            }
        },
    };

    info!(chat_id = %message.chat.id, ?command, "Answering command");
    if let Err(e) = bot.send_message(&message.chat.id, &reply).await {
        warn!(error = %e, chat_id = %message.chat.id, "Failed to send command reply");
    }
}
