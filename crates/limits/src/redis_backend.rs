use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sentrybot_config::AppConfig;

use crate::{LimitDecision, LimiterError, RateLimiter, Result};

/// Fast-path limiter using `INCR`/`EXPIRE` on a per-window key, grounded on
/// the same two-tier shape as a Redis-backed sliding window counter: the key
/// expires at the end of the window so stale buckets clean themselves up.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    per_window: u32,
    window_seconds: i64,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str, config: &AppConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            per_window: config.limits.per_user_per_hour,
            window_seconds: config.limits.window_seconds as i64,
        })
    }

    fn window_start(&self, now: i64) -> i64 {
        now - (now % self.window_seconds)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_increment(&self, user_id: i64, now: i64) -> Result<LimitDecision> {
        let window_start = self.window_start(now);
        let key = format!("ratelimit:{user_id}:{window_start}");

        let mut conn = self.conn.clone();
        let count: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| LimiterError::Backend(e.into()))?;
        if count == 1 {
            let _: () = conn
                .expire(&key, self.window_seconds)
                .await
                .map_err(|e| LimiterError::Backend(e.into()))?;
        }

        let allowed = count as u32 <= self.per_window;
        let remaining = self.per_window.saturating_sub(count as u32);
        let retry_after = if allowed {
            None
        } else {
            let window_end = window_start + self.window_seconds;
            Some(Duration::from_secs((window_end - now).max(0) as u64))
        };

        Ok(LimitDecision {
            allowed,
            remaining,
            retry_after,
        })
    }
}
