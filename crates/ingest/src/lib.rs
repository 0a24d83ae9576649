//! Message Ingest & Addressing: normalizes incoming updates, gates them
//! through the chat filter and per-user processing lock, detects addressing,
//! and aggregates albums. Transport-agnostic: built against a normalized
//! `IncomingMessage` shape so the telegram crate only has to map
//! `teloxide::types::Message` fields onto it.

pub mod addressing;
pub mod album;
pub mod filter;
pub mod lock;
pub mod media;

pub use addressing::{is_addressed, AddressingInput};
pub use album::{AlbumCache, AlbumJoin};
pub use filter::chat_allowed;
pub use lock::{LockGuard, ProcessingLocks};
pub use media::{download_and_validate, needs_recompression, sniff_signature, DownloadFn, MediaError};

/// Normalized shape of an inbound update, independent of `teloxide`'s wire
/// types, used as the pipeline's internal currency from ingest through to
/// the orchestrator.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub user_id: Option<i64>,
    pub telegram_message_id: i64,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub text: Option<String>,
    pub is_private: bool,
    pub is_reply_to_bot: bool,
    pub mentions_bot_username: bool,
    /// Telegram message id of the message being replied to, if any. Used by
    /// the context assembler to guarantee the referenced message is present.
    pub reply_to_telegram_message_id: Option<i64>,
    pub media_group_id: Option<String>,
    pub media_file_refs: Vec<String>,
    pub ts: i64,
}

/// Outcome of running an incoming update through the gate + addressing
/// stages, before any persistence or context assembly happens.
#[derive(Debug, Clone)]
pub enum IngestDecision {
    /// Chat filter rejected the update; drop silently.
    FilteredOut,
    /// Another turn is already in flight for this user; drop silently.
    LockBusy,
    /// Message is part of an album still waiting on siblings.
    AwaitingAlbumSiblings,
    /// Ready to hand to the orchestrator, tagged with whether it was
    /// addressed to the bot.
    Ready { addressed: bool },
}

pub struct IngestPipeline {
    pub locks: std::sync::Arc<ProcessingLocks>,
    pub albums: std::sync::Arc<AlbumCache>,
}

impl IngestPipeline {
    pub fn new(config: &sentrybot_config::IngestConfig) -> Self {
        Self {
            locks: std::sync::Arc::new(ProcessingLocks::new(std::time::Duration::from_secs(
                config.processing_lock_ttl_secs,
            ))),
            albums: std::sync::Arc::new(AlbumCache::default()),
        }
    }

    /// Runs the chat filter, addressing detection, and album aggregation in
    /// one pass. Does NOT acquire the processing lock — that only happens
    /// for addressed messages, per the spec's "bot-originated messages and
    /// non-addressed messages do NOT acquire the lock" rule, so callers must
    /// call `try_acquire_lock` themselves once they know the message is
    /// addressed and user-originated.
    pub async fn classify(
        &self,
        msg: &IncomingMessage,
        filter_config: &sentrybot_config::FilterConfig,
        user_is_admin: bool,
    ) -> IngestDecision {
        if !chat_allowed(filter_config, msg.chat_id, msg.is_private, user_is_admin) {
            return IngestDecision::FilteredOut;
        }

        if let Some(group_id) = &msg.media_group_id {
            let join = self
                .albums
                .register(group_id, msg.telegram_message_id.to_string())
                .await;
            if matches!(join, AlbumJoin::Joined) {
                return IngestDecision::AwaitingAlbumSiblings;
            }
        }

        let addressing_input = AddressingInput {
            text: msg.text.as_deref(),
            is_reply_to_bot: msg.is_reply_to_bot,
            mentions_bot_username: msg.mentions_bot_username,
        };
        let addressed = is_addressed(&addressing_input, filter_config);
        IngestDecision::Ready { addressed }
    }

    pub async fn try_acquire_lock(&self, chat_id: i64, user_id: i64) -> Option<LockGuard> {
        self.locks.try_acquire(chat_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_config::FilterConfig;

    fn sample_msg(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 1,
            thread_id: None,
            user_id: Some(1),
            telegram_message_id: 100,
            display_name: None,
            username: None,
            text: Some(text.to_string()),
            is_private: false,
            is_reply_to_bot: false,
            mentions_bot_username: false,
            reply_to_telegram_message_id: None,
            media_group_id: None,
            media_file_refs: Vec::new(),
            ts: 0,
        }
    }

    #[tokio::test]
    async fn filtered_chat_drops_silently() {
        let pipeline = IngestPipeline::new(&sentrybot_config::IngestConfig::default());
        let config = FilterConfig {
            chat_mode: sentrybot_config::ChatMode::Blacklist,
            blacklist_chat_ids: vec![1],
            ..Default::default()
        };
        let decision = pipeline.classify(&sample_msg("hello"), &config, false).await;
        assert!(matches!(decision, IngestDecision::FilteredOut));
    }

    #[tokio::test]
    async fn addressed_message_is_ready() {
        let pipeline = IngestPipeline::new(&sentrybot_config::IngestConfig::default());
        let mut msg = sample_msg("hey bot what's up");
        msg.is_reply_to_bot = true;
        let decision = pipeline.classify(&msg, &FilterConfig::default(), false).await;
        assert!(matches!(decision, IngestDecision::Ready { addressed: true }));
    }

    #[tokio::test]
    async fn album_sibling_waits() {
        let pipeline = IngestPipeline::new(&sentrybot_config::IngestConfig::default());
        let mut first = sample_msg("album");
        first.media_group_id = Some("g1".to_string());
        first.telegram_message_id = 1;

        let mut second = first.clone();
        second.telegram_message_id = 2;

        let config = FilterConfig::default();
        let first_decision = pipeline.classify(&first, &config, false).await;
        assert!(matches!(first_decision, IngestDecision::Ready { .. }));

        let second_decision = pipeline.classify(&second, &config, false).await;
        assert!(matches!(second_decision, IngestDecision::AwaitingAlbumSiblings));
    }
}
