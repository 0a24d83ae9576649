use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sentrybot_store::Store;

/// Produces a fresh summary string from a user's recent interaction history;
/// bound to the LLM gateway by the caller, kept abstract here so the memory
/// crate doesn't depend on it directly.
pub type SummarizeFn =
    Arc<dyn Fn(i64, i64) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

/// Background loop that refreshes stale profile summaries, matching the
/// teacher's pattern of spawning a `tokio::time::interval`-driven service
/// loop rather than reacting to individual writes.
pub struct ProfileSummarizer {
    store: Store,
    summarize: SummarizeFn,
    stale_after: Duration,
    batch_size: i64,
}

impl ProfileSummarizer {
    pub fn new(store: Store, summarize: SummarizeFn, stale_after: Duration, batch_size: i64) -> Self {
        Self {
            store,
            summarize,
            stale_after,
            batch_size,
        }
    }

    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let now = Utc::now().timestamp();
        let cutoff = now - self.stale_after.as_secs() as i64;
        let stale = self.store.profiles().stale_summaries(cutoff, self.batch_size).await?;

        let mut refreshed = 0;
        for profile in stale {
            if let Some(summary) = (self.summarize)(profile.user_id, profile.chat_id).await {
                self.store.profiles().update_summary(profile.id, &summary, now).await?;
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    pub fn spawn(self, tick: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = self.run_once().await {
                            tracing::warn!(error = %err, "profile summarizer pass failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::info!("profile summarizer shutting down");
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refreshes_only_stale_profiles() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.profiles().touch_user(1, 1, None, None, 1000).await.unwrap();

        let summarize: SummarizeFn = Arc::new(|_user, _chat| {
            Box::pin(async { Some("fresh summary".to_string()) })
        });
        let summarizer = ProfileSummarizer::new(store.clone(), summarize, Duration::from_secs(0), 10);

        let refreshed = summarizer.run_once().await.unwrap();
        assert_eq!(refreshed, 1);

        let profile = store.profiles().get(1, 1).await.unwrap().unwrap();
        assert_eq!(profile.summary.as_deref(), Some("fresh summary"));
    }
}
