//! Per-message pipeline: INGESTED → FILTERED? → ADDRESSED? → LOCK-ACQUIRED? →
//! RATE-OK? → BUILD-CONTEXT → GENERATE → SEND → PERSIST-REPLY →
//! TRACK-INTERACTION → UPDATE-WINDOW → RELEASE-LOCK.

pub mod tool_bridge;

use std::sync::Arc;

use sentrybot_config::AppConfig;
use sentrybot_context::ContextAssembler;
use sentrybot_episodes::{EpisodeEngine, WindowMessage};
use sentrybot_ingest::{IncomingMessage, IngestDecision, IngestPipeline};
use sentrybot_limits::{RateLimiter, ThrottleNoticeSuppressor};
use sentrybot_llm::{ChatMessage, GenerationResult, Gateway};
use sentrybot_memory::MemoryManager;
use sentrybot_selflearn::{SelfLearnEngine, TurnContext};
use sentrybot_store::messages::NewMessage;
use sentrybot_store::models::MessageRole;
use sentrybot_store::Store;
use sentrybot_tools::ToolRegistry;

const GENERATION_FAILURE_NOTICE: &str =
    "Вибач, зараз не можу відповісти — спробуй трохи пізніше.";

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    FilteredOut,
    LockBusy,
    AwaitingAlbumSiblings,
    StoredOnly,
    RateLimited { notice: Option<String> },
    Replied { text: String },
    GenerationFailed { notice: String },
}

pub struct Orchestrator {
    store: Store,
    memory: MemoryManager,
    context: ContextAssembler,
    episodes: Arc<EpisodeEngine>,
    selflearn: Arc<SelfLearnEngine>,
    ingest: IngestPipeline,
    limiter: Arc<dyn RateLimiter>,
    throttle: ThrottleNoticeSuppressor,
    gateway: Arc<dyn Gateway>,
    tools: Arc<ToolRegistry>,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        memory: MemoryManager,
        context: ContextAssembler,
        episodes: Arc<EpisodeEngine>,
        selflearn: Arc<SelfLearnEngine>,
        ingest: IngestPipeline,
        limiter: Arc<dyn RateLimiter>,
        throttle: ThrottleNoticeSuppressor,
        gateway: Arc<dyn Gateway>,
        tools: Arc<ToolRegistry>,
        config: AppConfig,
    ) -> Self {
        Self { store, memory, context, episodes, selflearn, ingest, limiter, throttle, gateway, tools, config }
    }

    pub async fn handle_message(
        &self,
        msg: IncomingMessage,
        user_is_admin: bool,
    ) -> anyhow::Result<PipelineOutcome> {
        let decision = self.ingest.classify(&msg, &self.config.filter, user_is_admin).await;

        let addressed = match decision {
            IngestDecision::FilteredOut => return Ok(PipelineOutcome::FilteredOut),
            IngestDecision::AwaitingAlbumSiblings => return Ok(PipelineOutcome::AwaitingAlbumSiblings),
            IngestDecision::Ready { addressed } => addressed,
        };

        let profile_id = match msg.user_id {
            Some(user_id) => {
                self.memory
                    .ensure_user_profile(user_id, msg.chat_id, msg.display_name.as_deref(), msg.username.as_deref(), msg.ts)
                    .await?
            }
            None => 0,
        };

        let message_id = self
            .store
            .messages()
            .append(
                NewMessage {
                    chat_id: msg.chat_id,
                    thread_id: msg.thread_id,
                    user_id: msg.user_id,
                    role: Some(MessageRole::User),
                    text: msg.text.clone(),
                    media_json: None,
                    ts: msg.ts,
                    telegram_message_id: Some(msg.telegram_message_id),
                    addressed,
                    reply_to_message_id: None,
                    media_group_id: msg.media_group_id.clone(),
                },
                msg.ts,
            )
            .await?;

        self.episodes
            .track_message(
                msg.chat_id,
                msg.thread_id,
                WindowMessage { id: message_id, user_id: msg.user_id, text: msg.text.clone(), embedding: None, ts: msg.ts },
                &self.config.episodes,
            )
            .await?;

        if !addressed {
            return Ok(PipelineOutcome::StoredOnly);
        }

        let Some(user_id) = msg.user_id else {
            return Ok(PipelineOutcome::StoredOnly);
        };

        let Some(_guard) = self.ingest.try_acquire_lock(msg.chat_id, user_id).await else {
            return Ok(PipelineOutcome::LockBusy);
        };

        let decision = self.limiter.check_and_increment(user_id, msg.ts).await?;
        if !decision.allowed {
            let should_notify = self.throttle.should_send(user_id, msg.ts).await?;
            let notice = should_notify.then(|| {
                "Забагато повідомлень — зачекай трохи.".to_string()
            });
            return Ok(PipelineOutcome::RateLimited { notice });
        }

        let query_text = msg.text.clone().unwrap_or_default();
        let context = self
            .context
            .assemble(
                msg.chat_id,
                msg.thread_id,
                user_id,
                &query_text,
                None,
                msg.reply_to_telegram_message_id,
            )
            .await?;

        let bot_profile_id = self.memory.ensure_bot_profile(msg.chat_id, msg.ts).await?;

        let mut messages = Vec::new();
        if let Some(system_context) = context.system_context() {
            messages.push(ChatMessage::system(system_context));
        }
        for (role, text) in context.as_turns() {
            messages.push(if role == "model" { ChatMessage::assistant(text) } else { ChatMessage::user(text) });
        }
        messages.push(ChatMessage::user(query_text));

        let tool_specs = tool_bridge::tool_specs_as_json(&self.tools);
        let tools = Arc::clone(&self.tools);
        let tool_callback = move |name: &str, args: &serde_json::Value| {
            let tools = Arc::clone(&tools);
            let name = name.to_string();
            let args = tool_bridge::build_tool_args(args, msg.chat_id, profile_id);
            Box::pin(async move { tool_bridge::run_tool(&tools, &name, &args).await })
                as std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send>>
        };

        let started = std::time::Instant::now();
        let timeout = std::time::Duration::from_secs(self.config.model.generation_timeout_secs);
        let generation = tokio::time::timeout(
            timeout,
            self.gateway.generate(messages, &tool_specs, &tool_callback, self.config.model.max_tool_rounds),
        )
        .await;

        let response_time_ms = started.elapsed().as_millis() as i64;

        let result: GenerationResult = match generation {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, chat_id = msg.chat_id, user_id, "generation failed");
                self.record_failed_reply(bot_profile_id, msg.chat_id, msg.thread_id, message_id, response_time_ms, msg.ts)
                    .await?;
                return Ok(PipelineOutcome::GenerationFailed { notice: GENERATION_FAILURE_NOTICE.to_string() });
            }
            Err(_elapsed) => {
                tracing::warn!(chat_id = msg.chat_id, user_id, "generation timed out");
                self.record_failed_reply(bot_profile_id, msg.chat_id, msg.thread_id, message_id, response_time_ms, msg.ts)
                    .await?;
                return Ok(PipelineOutcome::GenerationFailed { notice: GENERATION_FAILURE_NOTICE.to_string() });
            }
        };

        let reply_message_id = self
            .store
            .messages()
            .append(
                NewMessage {
                    chat_id: msg.chat_id,
                    thread_id: msg.thread_id,
                    user_id: None,
                    role: Some(MessageRole::Model),
                    text: Some(result.content.clone()),
                    media_json: None,
                    ts: msg.ts,
                    telegram_message_id: None,
                    addressed: false,
                    reply_to_message_id: Some(message_id),
                    media_group_id: None,
                },
                msg.ts,
            )
            .await?;

        self.episodes
            .track_message(
                msg.chat_id,
                msg.thread_id,
                WindowMessage { id: reply_message_id, user_id: None, text: Some(result.content.clone()), embedding: None, ts: msg.ts },
                &self.config.episodes,
            )
            .await?;

        self.selflearn
            .record_reply(bot_profile_id, msg.chat_id, msg.thread_id, reply_message_id, response_time_ms, 0, &[], None, msg.ts)
            .await?;

        Ok(PipelineOutcome::Replied { text: result.content })
    }

    /// Records the still-required neutral outcome row for a failed turn, per
    /// the rule that a failure still gets an outcome.
    async fn record_failed_reply(
        &self,
        bot_profile_id: i64,
        chat_id: i64,
        thread_id: Option<i64>,
        message_id: i64,
        response_time_ms: i64,
        now: i64,
    ) -> anyhow::Result<()> {
        self.selflearn
            .record_reply(bot_profile_id, chat_id, thread_id, message_id, response_time_ms, 0, &[], None, now)
            .await?;
        Ok(())
    }

    /// Called when a reply-worthy message from `user_id` arrives within the
    /// reaction window and is itself addressed to the bot: classifies it as
    /// a reaction to `reply_message_id` and reinforces bot-self facts.
    pub async fn record_reaction(
        &self,
        bot_profile_id: i64,
        reply_message_id: i64,
        reaction_text: &str,
        reaction_delay_seconds: i64,
        response_time_ms: Option<i64>,
        tools_used: Vec<String>,
        response_excerpt: String,
    ) -> anyhow::Result<sentrybot_selflearn::ReactionOutcome> {
        let ctx = TurnContext { bot_profile_id, response_time_ms, tools_used, response_excerpt };
        self.selflearn
            .record_reaction(bot_profile_id, reply_message_id, reaction_text, reaction_delay_seconds, &ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentrybot_config::{EpisodesConfig, IngestConfig, SelfLearnConfig};
    use sentrybot_context::ContextAssembler;
    use sentrybot_ingest::IngestPipeline;
    use sentrybot_limits::{AdminAwareLimiter, SqlxRateLimiter};
    use sentrybot_llm::{Result as GatewayResult, ToolCallback};

    struct StubGateway;

    #[async_trait]
    impl Gateway for StubGateway {
        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: &[serde_json::Value],
            _tool_callback: &ToolCallback<'_>,
            _max_rounds: u32,
        ) -> GatewayResult<GenerationResult> {
            Ok(GenerationResult { content: "hello there".to_string(), ..Default::default() })
        }

        async fn embed(&self, _text: &str) -> GatewayResult<Vec<f32>> {
            Ok(vec![])
        }
    }

    async fn build_orchestrator() -> Orchestrator {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let memory = MemoryManager::new(store.clone(), 0.85, None);
        let context = ContextAssembler::new(store.clone(), memory.clone(), Default::default());
        let episodes = Arc::new(EpisodeEngine::new(store.clone(), None, None));
        let selflearn = Arc::new(SelfLearnEngine::new(store.clone(), memory.clone(), SelfLearnConfig::default(), None));
        let ingest = IngestPipeline::new(&IngestConfig::default());
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(AdminAwareLimiter::new(SqlxRateLimiter::new(store.clone(), 20, 3600), vec![]));
        let throttle = ThrottleNoticeSuppressor::new(store.clone(), 600);
        let gateway: Arc<dyn Gateway> = Arc::new(StubGateway);
        let tools = Arc::new(ToolRegistry::default());
        let mut config = AppConfig::default();
        config.episodes = EpisodesConfig::default();

        Orchestrator::new(store, memory, context, episodes, selflearn, ingest, limiter, throttle, gateway, tools, config)
    }

    fn sample_msg(addressed_text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 1,
            thread_id: None,
            user_id: Some(12345),
            telegram_message_id: 1,
            display_name: Some("Taras".to_string()),
            username: None,
            text: Some(addressed_text.to_string()),
            is_private: false,
            is_reply_to_bot: true,
            mentions_bot_username: false,
            reply_to_telegram_message_id: None,
            media_group_id: None,
            media_file_refs: vec![],
            ts: 1000,
        }
    }

    #[tokio::test]
    async fn addressed_message_produces_a_reply() {
        let orchestrator = build_orchestrator().await;
        let outcome = orchestrator.handle_message(sample_msg("привіт"), false).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn non_addressed_message_is_stored_only() {
        let orchestrator = build_orchestrator().await;
        let mut msg = sample_msg("just chatting");
        msg.is_reply_to_bot = false;
        let outcome = orchestrator.handle_message(msg, false).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::StoredOnly));
    }

    #[tokio::test]
    async fn rate_limited_user_gets_notice_then_silence() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let memory = MemoryManager::new(store.clone(), 0.85, None);
        let context = ContextAssembler::new(store.clone(), memory.clone(), Default::default());
        let episodes = Arc::new(EpisodeEngine::new(store.clone(), None, None));
        let selflearn = Arc::new(SelfLearnEngine::new(store.clone(), memory.clone(), SelfLearnConfig::default(), None));
        let ingest = IngestPipeline::new(&IngestConfig::default());
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(AdminAwareLimiter::new(SqlxRateLimiter::new(store.clone(), 1, 3600), vec![]));
        let throttle = ThrottleNoticeSuppressor::new(store.clone(), 600);
        let gateway: Arc<dyn Gateway> = Arc::new(StubGateway);
        let tools = Arc::new(ToolRegistry::default());
        let config = AppConfig::default();

        let orchestrator =
            Orchestrator::new(store, memory, context, episodes, selflearn, ingest, limiter, throttle, gateway, tools, config);

        let first = orchestrator.handle_message(sample_msg("one"), false).await.unwrap();
        assert!(matches!(first, PipelineOutcome::Replied { .. }));

        // The processing lock guard releases via a spawned task on drop; give
        // it a tick to run before the next message for the same user arrives.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let mut second_msg = sample_msg("two");
        second_msg.telegram_message_id = 2;
        let second = orchestrator.handle_message(second_msg, false).await.unwrap();
        match second {
            PipelineOutcome::RateLimited { notice } => assert!(notice.is_some()),
            other => panic!("expected RateLimited, got {other:?}"),
        }

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let mut third_msg = sample_msg("three");
        third_msg.telegram_message_id = 3;
        let third = orchestrator.handle_message(third_msg, false).await.unwrap();
        match third {
            PipelineOutcome::RateLimited { notice } => assert!(notice.is_none()),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
