//! Multi-Level Context Assembler: composes Immediate / Recent / Relevant /
//! Background / Episodic layers under a token budget, each loaded in
//! parallel and enforcing its own sub-budget.

pub mod cache;
pub mod tokens;

pub use cache::ContextCache;
pub use tokens::estimate_tokens;

use std::time::Instant;

use sentrybot_config::ContextConfig;
use sentrybot_episodes::retrieve_relevant_episodes;
use sentrybot_memory::MemoryManager;
use sentrybot_retrieval::hybrid::{HybridSearch, HybridSearchConfig};
use sentrybot_store::models::{FactScope, MessageRole, MessageRow};
use sentrybot_store::Store;

#[derive(Debug, Clone, Default)]
pub struct LayerOutput {
    pub turns: Vec<(String, String)>,
    pub message_ids: Vec<i64>,
    pub tokens_used: usize,
}

#[derive(Debug, Clone)]
pub struct LayeredContext {
    pub immediate: LayerOutput,
    pub recent: LayerOutput,
    pub relevant: LayerOutput,
    pub background: Option<String>,
    pub episodic: Option<String>,
    pub total_tokens: usize,
    pub assembly_latency_ms: u128,
}

impl LayeredContext {
    /// Output format for the generator: ordered `(role, parts)` turns
    /// followed by an optional system-context string aggregating Background
    /// + Episodic textually.
    pub fn as_turns(&self) -> Vec<(String, String)> {
        let mut turns = Vec::new();
        turns.extend(self.recent.turns.clone());
        turns.extend(self.relevant.turns.clone());
        turns.extend(self.immediate.turns.clone());
        turns
    }

    pub fn system_context(&self) -> Option<String> {
        match (&self.background, &self.episodic) {
            (None, None) => None,
            (bg, ep) => Some(
                [bg.as_deref(), ep.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
        }
    }
}

fn row_to_turn(row: &MessageRow) -> (String, String) {
    let role = if row.role == "model" { "model" } else { "user" };
    (role.to_string(), row.text.clone().unwrap_or_default())
}

pub struct ContextAssembler {
    store: Store,
    memory: MemoryManager,
    config: ContextConfig,
    cache: ContextCache,
}

impl ContextAssembler {
    pub fn new(store: Store, memory: MemoryManager, config: ContextConfig) -> Self {
        let cache = ContextCache::new(
            config.l1_cache_capacity,
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(90),
        );
        Self { store, memory, config, cache }
    }

    pub async fn assemble(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        user_id: i64,
        query_text: &str,
        query_embedding: Option<&[f32]>,
        reply_to_telegram_message_id: Option<i64>,
    ) -> anyhow::Result<LayeredContext> {
        let start = Instant::now();
        let divisor = 4;

        if let Some(cached) = self.cache.get((chat_id, thread_id)).await {
            return Ok(cached);
        }

        let (immediate, recent, relevant, background, episodic) = tokio::join!(
            self.load_immediate(chat_id, thread_id, divisor),
            self.load_recent(chat_id, thread_id, divisor),
            self.load_relevant(chat_id, query_text, query_embedding, divisor),
            self.load_background(user_id, chat_id, divisor),
            self.load_episodic(chat_id, user_id, query_embedding, divisor),
        );

        let mut immediate = immediate?;
        let recent = recent?;
        let relevant = relevant?;
        let background = background?;
        let episodic = episodic?;

        if let Some(telegram_id) = reply_to_telegram_message_id {
            self.inject_reply_target(chat_id, telegram_id, &mut immediate, &recent, divisor)
                .await?;
        }

        let total_tokens = immediate.tokens_used
            + recent.tokens_used
            + relevant.tokens_used
            + background.as_deref().map(|s| estimate_tokens(s, divisor)).unwrap_or(0)
            + episodic.as_deref().map(|s| estimate_tokens(s, divisor)).unwrap_or(0);

        let context = LayeredContext {
            immediate,
            recent,
            relevant,
            background,
            episodic,
            total_tokens,
            assembly_latency_ms: start.elapsed().as_millis(),
        };

        self.cache.put((chat_id, thread_id), context.clone(), 0.0).await;
        Ok(context)
    }

    /// Ensures the message being replied to is present in context exactly
    /// once. If it already fell within the Immediate or Recent window it's
    /// left alone; otherwise it's fetched and prepended to Immediate so the
    /// generator always sees what the user is responding to.
    async fn inject_reply_target(
        &self,
        chat_id: i64,
        telegram_message_id: i64,
        immediate: &mut LayerOutput,
        recent: &LayerOutput,
        divisor: usize,
    ) -> anyhow::Result<()> {
        let target = self
            .store
            .messages()
            .by_telegram_message_id(chat_id, telegram_message_id)
            .await?;
        let Some(target) = target else {
            return Ok(());
        };
        if immediate.message_ids.contains(&target.id) || recent.message_ids.contains(&target.id) {
            return Ok(());
        }

        let turn = row_to_turn(&target);
        let tokens = estimate_tokens(&turn.1, divisor);
        immediate.turns.insert(0, turn);
        immediate.message_ids.insert(0, target.id);
        immediate.tokens_used += tokens;
        Ok(())
    }

    async fn load_immediate(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        divisor: usize,
    ) -> anyhow::Result<LayerOutput> {
        let budget = self.config.immediate_budget;
        let rows = self.store.messages().recent(chat_id, thread_id, 5).await?;
        Ok(fill_layer_budget(rows.into_iter().rev(), budget, divisor))
    }

    async fn load_recent(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        divisor: usize,
    ) -> anyhow::Result<LayerOutput> {
        let budget = self.config.recent_budget;
        let rows = self.store.messages().recent(chat_id, thread_id, 50).await?;
        Ok(fill_layer_budget(rows.into_iter().rev(), budget, divisor))
    }

    async fn load_relevant(
        &self,
        chat_id: i64,
        query_text: &str,
        query_embedding: Option<&[f32]>,
        divisor: usize,
    ) -> anyhow::Result<LayerOutput> {
        let budget = self.config.relevant_budget;
        let search = HybridSearch::new(&self.store, HybridSearchConfig::default());
        let ranked = search.search(chat_id, query_text, query_embedding, 20).await?;
        Ok(fill_layer_budget(ranked.into_iter().map(|r| r.message), budget, divisor))
    }

    async fn load_background(
        &self,
        user_id: i64,
        chat_id: i64,
        divisor: usize,
    ) -> anyhow::Result<Option<String>> {
        let budget = self.config.background_budget;
        let profile = self.store.profiles().get(user_id, chat_id).await?;

        let mut parts = Vec::new();
        if let Some(profile) = &profile {
            if let Some(summary) = &profile.summary {
                parts.push(summary.clone());
            }
        }
        if let Some(profile) = profile {
            let facts = self
                .memory
                .facts()
                .recall(FactScope::User, profile.id, 20)
                .await
                .unwrap_or_default();
            for fact in facts {
                parts.push(format!("{}: {} = {}", fact.category, fact.key, fact.value));
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }

        let mut used = 0;
        let mut kept = Vec::new();
        for part in parts {
            let part_tokens = estimate_tokens(&part, divisor);
            if used + part_tokens > budget {
                break;
            }
            used += part_tokens;
            kept.push(part);
        }
        Ok(Some(kept.join("\n")))
    }

    async fn load_episodic(
        &self,
        chat_id: i64,
        user_id: i64,
        query_embedding: Option<&[f32]>,
        divisor: usize,
    ) -> anyhow::Result<Option<String>> {
        let budget = self.config.episodic_budget;
        let now = chrono::Utc::now().timestamp();
        let episodes = retrieve_relevant_episodes(
            &self.store,
            chat_id,
            user_id,
            query_embedding,
            &[],
            0.0,
            5,
            now,
        )
        .await?;

        if episodes.is_empty() {
            return Ok(None);
        }

        let mut used = 0;
        let mut kept = Vec::new();
        for scored in episodes {
            let line = format!("{}: {}", scored.episode.topic, scored.episode.summary);
            let tokens = estimate_tokens(&line, divisor);
            if used + tokens > budget {
                break;
            }
            used += tokens;
            kept.push(line);
        }
        if kept.is_empty() {
            Ok(None)
        } else {
            Ok(Some(kept.join("\n")))
        }
    }
}

fn fill_layer_budget(
    rows: impl Iterator<Item = MessageRow>,
    budget: usize,
    divisor: usize,
) -> LayerOutput {
    let mut used = 0;
    let mut turns = Vec::new();
    let mut message_ids = Vec::new();
    for row in rows {
        let turn = row_to_turn(&row);
        let tokens = estimate_tokens(&turn.1, divisor);
        if used + tokens > budget {
            continue;
        }
        used += tokens;
        message_ids.push(row.id);
        turns.push(turn);
    }
    LayerOutput { turns, message_ids, tokens_used: used }
}
