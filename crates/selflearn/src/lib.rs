//! Bot Self-Learning: records what happened on every reply, classifies the
//! user's next message as a reaction when it's addressed to the bot within
//! the reaction window, reinforces facts about the bot's own behavior, and
//! rolls reactions up into an effectiveness summary.

pub mod effectiveness;
pub mod insight;
pub mod reinforce;
pub mod sentiment;

pub use effectiveness::EffectivenessSummary;
pub use insight::{generate_insight, Insight, InsightFn};
pub use reinforce::TurnContext;
pub use sentiment::{classify_reaction, ReactionOutcome};

use sentrybot_config::SelfLearnConfig;
use sentrybot_memory::MemoryManager;
use sentrybot_store::models::FactScope;
use sentrybot_store::outcomes::NewOutcome;
use sentrybot_store::Store;

pub struct SelfLearnEngine {
    store: Store,
    memory: MemoryManager,
    config: SelfLearnConfig,
    insight_fn: Option<InsightFn>,
}

impl SelfLearnEngine {
    pub fn new(
        store: Store,
        memory: MemoryManager,
        config: SelfLearnConfig,
        insight_fn: Option<InsightFn>,
    ) -> Self {
        Self { store, memory, config, insight_fn }
    }

    /// Called right after the bot replies: records a neutral placeholder
    /// outcome that `record_reaction` will later refine if the user reacts
    /// within the window.
    pub async fn record_reply(
        &self,
        bot_profile_id: i64,
        chat_id: i64,
        thread_id: Option<i64>,
        message_id: i64,
        response_time_ms: i64,
        token_count: i64,
        tools_used: &[String],
        episode_id: Option<i64>,
        now: i64,
    ) -> anyhow::Result<i64> {
        let id = self
            .store
            .outcomes()
            .insert(
                NewOutcome {
                    bot_profile_id,
                    chat_id,
                    thread_id,
                    message_id,
                    interaction_type: "reply",
                    outcome: "neutral",
                    sentiment_score: None,
                    response_time_ms: Some(response_time_ms),
                    token_count: Some(token_count),
                    tools_used,
                    context_snapshot: None,
                    episode_id,
                },
                now,
            )
            .await?;
        Ok(id)
    }

    /// Called when the user's next message (within the reaction window) is
    /// addressed to the bot: classifies it, writes a `user_reaction`
    /// outcome row tied to `reply_message_id`, and reinforces bot-self
    /// facts.
    pub async fn record_reaction(
        &self,
        bot_profile_id: i64,
        reply_message_id: i64,
        reaction_text: &str,
        reaction_delay_seconds: i64,
        ctx: &TurnContext,
    ) -> anyhow::Result<ReactionOutcome> {
        let outcome = classify_reaction(reaction_text);

        self.store
            .outcomes()
            .record_reaction(
                reply_message_id,
                outcome.as_str(),
                outcome.as_str(),
                Some(outcome.sentiment_score()),
                reaction_delay_seconds,
            )
            .await?;

        reinforce::reinforce_from_reaction(
            &self.memory,
            outcome,
            ctx,
            self.config.slow_response_ms,
            self.config.mistake_decay_rate,
            self.config.performance_decay_rate,
        )
        .await?;

        Ok(outcome)
    }

    pub async fn effectiveness_summary(
        &self,
        bot_profile_id: i64,
        now: i64,
    ) -> anyhow::Result<EffectivenessSummary> {
        let window_start = now - self.config.effectiveness_window_days * 86_400;
        let rows = self.store.outcomes().recent_for_bot(bot_profile_id, 500).await?;
        let windowed: Vec<_> = rows.into_iter().filter(|r| r.created_at >= window_start).collect();
        Ok(effectiveness::summarize(&windowed))
    }

    /// Generates a reflection insight from the current effectiveness
    /// summary and the bot's own top facts. Returns `None` when no insight
    /// closure was configured or generation wasn't enabled.
    pub async fn reflect(&self, bot_profile_id: i64, now: i64) -> anyhow::Result<Option<Insight>> {
        if !self.config.insight_generation_enabled {
            return Ok(None);
        }
        let Some(insight_fn) = &self.insight_fn else {
            return Ok(None);
        };

        let summary = self.effectiveness_summary(bot_profile_id, now).await?;
        let facts = self.memory.facts().recall(FactScope::Bot, bot_profile_id, 10).await?;
        let top_facts: Vec<String> =
            facts.iter().map(|f| format!("{}: {} = {}", f.category, f.key, f.value)).collect();

        Ok(generate_insight(insight_fn, &summary, &top_facts).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_store::messages::NewMessage;
    use sentrybot_store::models::MessageRole;

    async fn engine() -> (SelfLearnEngine, i64, i64) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let bot_profile_id = store.profiles().ensure_bot_profile(1, 1000).await.unwrap();
        let message_id = store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                user_id: None,
                role: Some(MessageRole::Model),
                text: Some("here's the answer".to_string()),
                ts: 1000,
                ..Default::default()
            })
            .await
            .unwrap();
        let memory = MemoryManager::new(store.clone(), 0.85, None);
        let engine = SelfLearnEngine::new(store, memory, SelfLearnConfig::default(), None);
        (engine, bot_profile_id, message_id)
    }

    #[tokio::test]
    async fn record_reply_then_reaction_round_trips() {
        let (engine, bot_profile_id, message_id) = engine().await;

        engine
            .record_reply(bot_profile_id, 1, None, message_id, 300, 120, &[], None, 1000)
            .await
            .unwrap();

        let ctx = TurnContext {
            bot_profile_id,
            response_time_ms: Some(300),
            tools_used: vec![],
            response_excerpt: "here's the answer".to_string(),
        };
        let outcome = engine
            .record_reaction(bot_profile_id, message_id, "thanks, perfect!", 5, &ctx)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::Praised);

        let summary = engine.effectiveness_summary(bot_profile_id, 1000).await.unwrap();
        assert_eq!(summary.sample_size, 1);
        assert_eq!(summary.recent_effectiveness, 1.0);
    }

    #[tokio::test]
    async fn reflect_returns_none_when_not_enabled() {
        let (engine, bot_profile_id, _) = engine().await;
        let insight = engine.reflect(bot_profile_id, 1000).await.unwrap();
        assert!(insight.is_none());
    }
}
