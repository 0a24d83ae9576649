//! Sliding-window rate limiting: a fixed-bucket counter keyed by
//! `(user_id, feature, window_start)`, with an optional fast-path shared
//! cache in front of the persistent fallback, plus per-feature cooldowns
//! and a throttle-notice suppression window so a rate-limited user isn't
//! spammed with "slow down" replies on every message.

#[cfg(feature = "redis")]
mod redis_backend;

use std::time::Duration;

use async_trait::async_trait;
use sentrybot_config::AppConfig;
use sentrybot_store::Store;

#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LimiterError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<Duration>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_increment(&self, user_id: i64, now: i64) -> Result<LimitDecision>;
}

/// Persistent fallback backed by `sentrybot-store`'s `rate_limits` table.
/// Always available; the backend of last resort.
pub struct SqlxRateLimiter {
    store: Store,
    per_window: u32,
    window_seconds: i64,
}

impl SqlxRateLimiter {
    pub fn new(store: Store, per_window: u32, window_seconds: i64) -> Self {
        Self {
            store,
            per_window,
            window_seconds,
        }
    }

    fn window_start(&self, now: i64) -> i64 {
        now - (now % self.window_seconds)
    }
}

#[async_trait]
impl RateLimiter for SqlxRateLimiter {
    async fn check_and_increment(&self, user_id: i64, now: i64) -> Result<LimitDecision> {
        let window_start = self.window_start(now);
        let (count, incremented) = self
            .store
            .limits()
            .increment_window(user_id, "chat", window_start, self.per_window)
            .await
            .map_err(|e| LimiterError::Backend(e.into()))?;

        let allowed = incremented;
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

/// Tries a fast-path backend first (e.g. Redis), falling back to the
/// persistent backend on any backend error. A backend failure is logged but
/// never blocks a request — the request is simply served from the fallback.
pub struct TieredLimiter {
    fast: Option<Box<dyn RateLimiter>>,
    fallback: Box<dyn RateLimiter>,
}

impl TieredLimiter {
    pub fn new(fast: Option<Box<dyn RateLimiter>>, fallback: Box<dyn RateLimiter>) -> Self {
        Self { fast, fallback }
    }
}

#[async_trait]
impl RateLimiter for TieredLimiter {
    async fn check_and_increment(&self, user_id: i64, now: i64) -> Result<LimitDecision> {
        if let Some(fast) = &self.fast {
            match fast.check_and_increment(user_id, now).await {
                Ok(decision) => return Ok(decision),
                Err(err) => {
                    tracing::warn!(error = %err, "fast-path rate limiter unavailable, falling back");
                }
            }
        }
        self.fallback.check_and_increment(user_id, now).await
    }
}

/// Wraps any limiter with an admin bypass, per the invariant that admin
/// user IDs never have counters enforced against them.
pub struct AdminAwareLimiter<L: RateLimiter> {
    inner: L,
    admin_ids: Vec<i64>,
}

impl<L: RateLimiter> AdminAwareLimiter<L> {
    pub fn new(inner: L, admin_ids: Vec<i64>) -> Self {
        Self { inner, admin_ids }
    }
}

#[async_trait]
impl<L: RateLimiter> RateLimiter for AdminAwareLimiter<L> {
    async fn check_and_increment(&self, user_id: i64, now: i64) -> Result<LimitDecision> {
        if self.admin_ids.contains(&user_id) {
            return Ok(LimitDecision {
                allowed: true,
                remaining: u32::MAX,
                retry_after: None,
            });
        }
        self.inner.check_and_increment(user_id, now).await
    }
}

/// Suppresses repeated "you're being rate limited" notices to the same
/// user within `cooldown_seconds`, backed by the `feature_cooldowns` table.
pub struct ThrottleNoticeSuppressor {
    store: Store,
    cooldown_seconds: i64,
}

impl ThrottleNoticeSuppressor {
    pub fn new(store: Store, cooldown_seconds: i64) -> Self {
        Self {
            store,
            cooldown_seconds,
        }
    }

    pub async fn should_send(&self, user_id: i64, now: i64) -> anyhow::Result<bool> {
        let last = self.store.limits().last_used(user_id, "throttle_notice").await?;
        let should = match last {
            Some(last_ts) => now - last_ts >= self.cooldown_seconds,
            None => true,
        };
        if should {
            self.store
                .limits()
                .mark_used(user_id, "throttle_notice", now)
                .await?;
        }
        Ok(should)
    }
}

pub async fn build_limiter(store: Store, config: &AppConfig) -> AdminAwareLimiter<TieredLimiter> {
    let fallback: Box<dyn RateLimiter> = Box::new(SqlxRateLimiter::new(
        store.clone(),
        config.limits.per_user_per_hour,
        config.limits.window_seconds as i64,
    ));

    #[cfg(feature = "redis")]
    let fast: Option<Box<dyn RateLimiter>> = match config.operational.redis_url.as_deref() {
        Some(url) => match redis_backend::RedisRateLimiter::connect(url, config).await {
            Ok(limiter) => Some(Box::new(limiter) as Box<dyn RateLimiter>),
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect redis rate limiter, using fallback only");
                None
            }
        },
        None => None,
    };

    #[cfg(not(feature = "redis"))]
    let fast: Option<Box<dyn RateLimiter>> = None;

    let tiered = TieredLimiter::new(fast, fallback);
    AdminAwareLimiter::new(tiered, config.auth.admin_user_ids.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_store::Store;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn allows_up_to_the_configured_budget() {
        let store = test_store().await;
        let limiter = SqlxRateLimiter::new(store, 3, 3600);

        for _ in 0..3 {
            let decision = limiter.check_and_increment(1, 1000).await.unwrap();
            assert!(decision.allowed);
        }
        let fourth = limiter.check_and_increment(1, 1000).await.unwrap();
        assert!(!fourth.allowed);
        assert!(fourth.retry_after.is_some());
    }

    #[tokio::test]
    async fn window_resets_after_window_seconds() {
        let store = test_store().await;
        let limiter = SqlxRateLimiter::new(store, 1, 3600);

        assert!(limiter.check_and_increment(1, 0).await.unwrap().allowed);
        assert!(!limiter.check_and_increment(1, 1800).await.unwrap().allowed);
        assert!(limiter.check_and_increment(1, 3700).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn admin_bypasses_all_limits() {
        let store = test_store().await;
        let inner = SqlxRateLimiter::new(store, 1, 3600);
        let admin_limiter = AdminAwareLimiter::new(inner, vec![42]);

        for _ in 0..10 {
            let decision = admin_limiter.check_and_increment(42, 1000).await.unwrap();
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn throttle_notice_is_suppressed_within_cooldown() {
        let store = test_store().await;
        let suppressor = ThrottleNoticeSuppressor::new(store, 600);

        assert!(suppressor.should_send(1, 1000).await.unwrap());
        assert!(!suppressor.should_send(1, 1300).await.unwrap());
        assert!(suppressor.should_send(1, 1601).await.unwrap());
    }
}
