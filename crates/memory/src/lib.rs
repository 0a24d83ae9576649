//! Fact & Profile Store: extraction, semantic deduplication, confidence
//! updates, and retrieval of facts about users, chats, and the bot itself,
//! plus background profile-summary refresh. Builds on `sentrybot-store`'s
//! relational tables the way the teacher's `MemoryManager`/`MemoryStore`
//! pair builds on an in-process store, generalized to a SQL-backed one.

pub mod embed;
pub mod facts;
pub mod profiles;

pub use embed::EmbedFn;
pub use facts::{FactOutcome, FactStore, FactWrite};
pub use profiles::{ProfileSummarizer, SummarizeFn};

use sentrybot_store::models::FactScope;
use sentrybot_store::Store;

/// Thin facade over the store + fact/profile modules, the single entry
/// point the orchestrator and tools crate depend on.
#[derive(Clone)]
pub struct MemoryManager {
    store: Store,
    dedup_threshold: f32,
    embed_fn: Option<EmbedFn>,
}

impl MemoryManager {
    pub fn new(store: Store, dedup_threshold: f32, embed_fn: Option<EmbedFn>) -> Self {
        Self {
            store,
            dedup_threshold,
            embed_fn,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn facts(&self) -> FactStore<'_> {
        FactStore::new(&self.store, self.dedup_threshold, self.embed_fn.clone())
    }

    pub async fn ensure_user_profile(
        &self,
        user_id: i64,
        chat_id: i64,
        display_name: Option<&str>,
        username: Option<&str>,
        now: i64,
    ) -> anyhow::Result<i64> {
        Ok(self
            .store
            .profiles()
            .touch_user(user_id, chat_id, display_name, username, now)
            .await?)
    }

    pub async fn ensure_bot_profile(&self, chat_id: i64, now: i64) -> anyhow::Result<i64> {
        Ok(self.store.profiles().ensure_bot_profile(chat_id, now).await?)
    }

    pub fn fact_scope_user() -> FactScope {
        FactScope::User
    }

    pub fn fact_scope_chat() -> FactScope {
        FactScope::Chat
    }

    pub fn fact_scope_bot() -> FactScope {
        FactScope::Bot
    }
}
