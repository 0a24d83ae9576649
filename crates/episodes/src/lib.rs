//! Episode Engine: tracks in-memory conversation windows, detects semantic +
//! temporal + marker boundaries, and emits/persists episodes via
//! `sentrybot-store`.

pub mod boundary;
pub mod emit;
pub mod monitor;
pub mod retrieval;
pub mod window;

pub use emit::{EmbedFn, GeneratedSummary, SummarizeFn};
pub use retrieval::{retrieve_relevant_episodes, ScoredEpisode};
pub use window::{ConversationWindow, WindowMessage};

use std::collections::HashMap;
use std::sync::Arc;

use sentrybot_config::EpisodesConfig;
use sentrybot_store::Store;
use tokio::sync::Mutex;

type WindowKey = (i64, Option<i64>);

/// Owns every `ConversationWindow` for the process — the sole writer, per
/// the data model's ownership invariant.
pub struct EpisodeEngine {
    store: Store,
    windows: Mutex<HashMap<WindowKey, ConversationWindow>>,
    summarize: Option<SummarizeFn>,
    embed: Option<EmbedFn>,
}

impl EpisodeEngine {
    pub fn new(store: Store, summarize: Option<SummarizeFn>, embed: Option<EmbedFn>) -> Self {
        Self {
            store,
            windows: Mutex::new(HashMap::new()),
            summarize,
            embed,
        }
    }

    /// Appends a message to its window, forcing a boundary check (and
    /// possible close) once the window hits its size cap.
    pub async fn track_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        msg: WindowMessage,
        config: &EpisodesConfig,
    ) -> anyhow::Result<()> {
        let key = (chat_id, thread_id);
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key).or_default();
        window.push(msg);

        if window.at_capacity(config.max_messages_per_window) {
            let closed = if boundary::boundary_detected(&window.messages, config) {
                Some(std::mem::take(window))
            } else {
                None
            };
            if let Some(closed) = closed {
                windows.remove(&key);
                drop(windows);
                self.close_window(chat_id, thread_id, &closed, config).await?;
            }
        }
        Ok(())
    }

    pub async fn tracked_keys(&self) -> Vec<WindowKey> {
        self.windows.lock().await.keys().copied().collect()
    }

    /// Checks one window: closes on idle timeout (emitting if eligible), or
    /// runs a boundary check without closing if merely large. Used by the
    /// monitor loop.
    pub async fn check_and_maybe_close(
        &self,
        key: WindowKey,
        now: i64,
        config: &EpisodesConfig,
    ) -> anyhow::Result<()> {
        let (chat_id, thread_id) = key;
        let mut windows = self.windows.lock().await;
        let Some(window) = windows.get(&key) else {
            return Ok(());
        };

        let idle = window.is_idle(now, config.window_timeout_secs);
        if idle {
            let eligible = window.eligible_for_episode(config.min_messages);
            let window = windows.remove(&key).unwrap();
            drop(windows);
            if eligible {
                self.close_window(chat_id, thread_id, &window, config).await?;
            }
        }
        Ok(())
    }

    async fn close_window(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        window: &ConversationWindow,
        _config: &EpisodesConfig,
    ) -> anyhow::Result<()> {
        let now = chrono::Utc::now().timestamp();
        emit::emit_episode(
            &self.store,
            chat_id,
            thread_id,
            window,
            self.summarize.as_ref(),
            self.embed.as_ref(),
            now,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_window_past_timeout_emits_episode() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine = Arc::new(EpisodeEngine::new(store.clone(), None, None));
        let config = EpisodesConfig { window_timeout_secs: 100, min_messages: 2, ..Default::default() };

        for i in 0..3 {
            engine
                .track_message(
                    1,
                    None,
                    WindowMessage { id: i, user_id: Some(1), text: Some("hi".into()), embedding: None, ts: i },
                    &config,
                )
                .await
                .unwrap();
        }

        engine.check_and_maybe_close((1, None), 1000, &config).await.unwrap();

        let episodes = store.episodes().recent_for_chat(1, 10).await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert!(engine.tracked_keys().await.is_empty());
    }

    #[tokio::test]
    async fn active_window_not_past_timeout_is_untouched() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine = Arc::new(EpisodeEngine::new(store.clone(), None, None));
        let config = EpisodesConfig { window_timeout_secs: 10_000, min_messages: 2, ..Default::default() };

        engine
            .track_message(
                1,
                None,
                WindowMessage { id: 1, user_id: Some(1), text: Some("hi".into()), embedding: None, ts: 0 },
                &config,
            )
            .await
            .unwrap();

        engine.check_and_maybe_close((1, None), 5, &config).await.unwrap();
        assert_eq!(engine.tracked_keys().await.len(), 1);
    }
}
