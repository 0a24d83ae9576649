//! Telegram transport: long-polls the Bot API via `teloxide`'s `Dispatcher`,
//! maps updates onto the ingest crate's `IncomingMessage`, and drives the
//! orchestrator and command router. Kept thin — all decisioning lives
//! downstream; this crate only knows how to talk to Telegram.

pub mod commands;
pub mod mapping;

use std::sync::Arc;

use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, UserId};

use sentrybot_config::AppConfig;
use sentrybot_orchestrator::{Orchestrator, PipelineOutcome};

use commands::CommandContext;

/// Telegram caps a single message at ~4096 UTF-16 code units; chunk on line
/// boundaries under that so a long reply doesn't get truncated mid-word.
const MAX_MESSAGE_CHARS: usize = 3500;

#[derive(Clone)]
struct BotIdentity {
    user_id: UserId,
    username: String,
}

pub struct TelegramBot {
    bot: Bot,
    orchestrator: Arc<Orchestrator>,
    commands: Arc<CommandContext>,
    config: AppConfig,
}

impl TelegramBot {
    pub fn new(token: String, orchestrator: Arc<Orchestrator>, commands: Arc<CommandContext>, config: AppConfig) -> Self {
        Self { bot: Bot::new(token), orchestrator, commands, config }
    }

    /// Fetches the bot's own identity, then drives the long-polling
    /// dispatcher until the process exits.
    pub async fn run(self) -> anyhow::Result<()> {
        let me = self.bot.get_me().await?;
        let identity = BotIdentity { user_id: me.user.id, username: me.user.username.clone().unwrap_or_default() };

        let handler = Update::filter_message().endpoint(handle_update);

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.orchestrator, self.commands, self.config, identity])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

async fn handle_update(
    bot: Bot,
    msg: Message,
    orchestrator: Arc<Orchestrator>,
    commands: Arc<CommandContext>,
    config: AppConfig,
    identity: BotIdentity,
) -> ResponseResult<()> {
    if let Err(err) = route(&bot, &msg, &identity, &orchestrator, &commands, &config).await {
        tracing::warn!(error = %err, chat_id = msg.chat.id.0, "failed to handle telegram update");
    }
    Ok(())
}

async fn route(
    bot: &Bot,
    msg: &Message,
    identity: &BotIdentity,
    orchestrator: &Orchestrator,
    commands: &CommandContext,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let Some(user_id) = msg.from().map(|u| u.id.0 as i64) else {
        return Ok(());
    };
    let is_admin = config.is_admin(user_id);

    if commands.is_banned(msg.chat.id.0, user_id).await.unwrap_or(false) && !is_admin {
        return Ok(());
    }

    if let Some(text) = msg.text() {
        let trimmed = text.trim();
        if trimmed.starts_with('/') && !trimmed.starts_with("/gryag") {
            let reply = commands.handle(msg.chat.id.0, user_id, is_admin, trimmed).await;
            send_response(bot, msg.chat.id, &reply).await;
            return Ok(());
        }
    }

    let Some(mut incoming) = mapping::from_teloxide(msg, identity.user_id, &identity.username) else {
        return Ok(());
    };

    if let Some(text) = &incoming.text {
        if let Some(rest) = text.trim().strip_prefix("/gryag") {
            incoming.text = Some(rest.trim().to_string());
            incoming.mentions_bot_username = true;
        }
    }

    let outcome = orchestrator.handle_message(incoming, is_admin).await?;
    match outcome {
        PipelineOutcome::Replied { text } => send_response(bot, msg.chat.id, &text).await,
        PipelineOutcome::RateLimited { notice: Some(text) } => send_response(bot, msg.chat.id, &text).await,
        PipelineOutcome::GenerationFailed { notice } => send_response(bot, msg.chat.id, &notice).await,
        PipelineOutcome::FilteredOut
        | PipelineOutcome::LockBusy
        | PipelineOutcome::AwaitingAlbumSiblings
        | PipelineOutcome::StoredOnly
        | PipelineOutcome::RateLimited { notice: None } => {}
    }
    Ok(())
}

/// Sends `text` to `chat_id`, chunked to Telegram's message limit. Each
/// chunk tries Markdown first; if Telegram rejects the parse (unbalanced
/// entities from model output), it falls back to a plain-text resend rather
/// than dropping the reply.
async fn send_response(bot: &Bot, chat_id: ChatId, text: &str) {
    for chunk in chunk_message(text, MAX_MESSAGE_CHARS) {
        let sent = bot.send_message(chat_id, &chunk).parse_mode(ParseMode::Markdown).await;
        if sent.is_err() {
            if let Err(err) = bot.send_message(chat_id, &chunk).await {
                tracing::warn!(error = %err, chat_id = chat_id.0, "sendMessage failed");
            }
        }
    }
}

fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count() + 1;
        if current_len > 0 && current_len + line_len > max_chars {
            chunks.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_a_single_chunk() {
        assert_eq!(chunk_message("hello", 3500), vec!["hello".to_string()]);
    }

    #[test]
    fn long_message_splits_on_line_boundaries() {
        let line = "x".repeat(10);
        let text = std::iter::repeat(line.clone()).take(500).collect::<Vec<_>>().join("\n");
        let chunks = chunk_message(&text, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }
}
