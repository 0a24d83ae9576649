//! Relational persistence for messages, profiles, facts, episodes, prompts,
//! and rate-limit counters. Backed by SQLite with an FTS5 shadow index kept
//! in sync by triggers; the schema is applied idempotently at startup via
//! embedded migrations.

pub mod episodes;
pub mod error;
pub mod facts;
pub mod limits;
pub mod messages;
pub mod models;
pub mod outcomes;
pub mod profiles;
pub mod prompts;
mod retry;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use error::{Result, StoreError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        sqlx::query("INSERT INTO messages_fts(messages_fts) VALUES ('rebuild')")
            .execute(&pool)
            .await
            .ok();

        tracing::info!(database_url, "store connected and migrated");
        Ok(Self { pool })
    }

    pub fn messages(&self) -> messages::MessageRepo<'_> {
        messages::MessageRepo { pool: &self.pool }
    }

    pub fn profiles(&self) -> profiles::ProfileRepo<'_> {
        profiles::ProfileRepo { pool: &self.pool }
    }

    pub fn facts(&self) -> facts::FactRepo<'_> {
        facts::FactRepo { pool: &self.pool }
    }

    pub fn episodes(&self) -> episodes::EpisodeRepo<'_> {
        episodes::EpisodeRepo { pool: &self.pool }
    }

    pub fn prompts(&self) -> prompts::PromptRepo<'_> {
        prompts::PromptRepo { pool: &self.pool }
    }

    pub fn limits(&self) -> limits::LimitRepo<'_> {
        limits::LimitRepo { pool: &self.pool }
    }

    pub fn outcomes(&self) -> outcomes::OutcomeRepo<'_> {
        outcomes::OutcomeRepo { pool: &self.pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messages::NewMessage;
    use models::MessageRole;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn append_and_recent_round_trip() {
        let store = test_store().await;
        let id = store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("hello there".to_string()),
                ts: 1000,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(id > 0);

        let recent = store.messages().recent(1, None, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn keyword_search_finds_matching_messages() {
        let store = test_store().await;
        store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("the quick brown fox".to_string()),
                ts: 1000,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("completely unrelated text".to_string()),
                ts: 1001,
                ..Default::default()
            })
            .await
            .unwrap();

        let hits = store.messages().keyword_search(1, "fox", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn touch_user_creates_then_increments() {
        let store = test_store().await;
        let id1 = store
            .profiles()
            .touch_user(10, 1, Some("Alice"), None, 1000)
            .await
            .unwrap();
        let id2 = store
            .profiles()
            .touch_user(10, 1, None, Some("alice99"), 1100)
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let profile = store.profiles().get(10, 1).await.unwrap().unwrap();
        assert_eq!(profile.interaction_count, 2);
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.username.as_deref(), Some("alice99"));
    }

    #[tokio::test]
    async fn system_prompt_set_active_deactivates_prior_version() {
        let store = test_store().await;
        store
            .prompts()
            .set_active("global", None, "prompt v1", 1000)
            .await
            .unwrap();
        store
            .prompts()
            .set_active("global", None, "prompt v2", 1100)
            .await
            .unwrap();

        let active = store.prompts().active("global", None).await.unwrap().unwrap();
        assert_eq!(active.text, "prompt v2");
        assert_eq!(active.version, 2);
    }

    #[tokio::test]
    async fn rate_limit_window_increments_monotonically() {
        let store = test_store().await;
        let (c1, inc1) = store.limits().increment_window(1, "chat", 0, 20).await.unwrap();
        let (c2, inc2) = store.limits().increment_window(1, "chat", 0, 20).await.unwrap();
        let (c3, inc3) = store.limits().increment_window(1, "chat", 3600, 20).await.unwrap();
        assert_eq!(c1, 1);
        assert_eq!(c2, 2);
        assert_eq!(c3, 1);
        assert!(inc1 && inc2 && inc3);
    }

    #[tokio::test]
    async fn rate_limit_window_stops_incrementing_at_limit() {
        let store = test_store().await;
        let (count, incremented) = store.limits().increment_window(1, "chat", 0, 2).await.unwrap();
        assert_eq!((count, incremented), (1, true));
        let (count, incremented) = store.limits().increment_window(1, "chat", 0, 2).await.unwrap();
        assert_eq!((count, incremented), (2, true));
        let (count, incremented) = store.limits().increment_window(1, "chat", 0, 2).await.unwrap();
        assert_eq!((count, incremented), (2, false));
        let (count, incremented) = store.limits().increment_window(1, "chat", 0, 2).await.unwrap();
        assert_eq!((count, incremented), (2, false));
    }
}
