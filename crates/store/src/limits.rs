use sqlx::SqlitePool;

use crate::error::Result;
use crate::retry::with_retries;

pub struct LimitRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

impl<'a> LimitRepo<'a> {
    /// Increments the counter for the fixed window starting at `window_start`
    /// and returns `(count, incremented)`. If the window is already at or
    /// over `limit`, the row is left untouched, the existing count is
    /// returned as-is, and `incremented` is `false`.
    pub async fn increment_window(
        &self,
        user_id: i64,
        feature: &str,
        window_start: i64,
        limit: u32,
    ) -> Result<(i64, bool)> {
        with_retries(|| async {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT count FROM rate_limits WHERE user_id = ? AND feature = ? AND window_start = ?",
            )
            .bind(user_id)
            .bind(feature)
            .bind(window_start)
            .fetch_optional(self.pool)
            .await?;

            if let Some(count) = existing {
                if count >= limit as i64 {
                    return Ok((count, false));
                }
            }

            sqlx::query(
                "INSERT INTO rate_limits (user_id, feature, window_start, count)
                 VALUES (?, ?, ?, 1)
                 ON CONFLICT (user_id, feature, window_start)
                 DO UPDATE SET count = count + 1",
            )
            .bind(user_id)
            .bind(feature)
            .bind(window_start)
            .execute(self.pool)
            .await?;

            let count: i64 = sqlx::query_scalar(
                "SELECT count FROM rate_limits WHERE user_id = ? AND feature = ? AND window_start = ?",
            )
            .bind(user_id)
            .bind(feature)
            .bind(window_start)
            .fetch_one(self.pool)
            .await?;
            Ok((count, true))
        })
        .await
    }

    pub async fn last_used(&self, user_id: i64, feature: &str) -> Result<Option<i64>> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT last_used FROM feature_cooldowns WHERE user_id = ? AND feature = ?",
        )
        .bind(user_id)
        .bind(feature)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_used(&self, user_id: i64, feature: &str, now: i64) -> Result<()> {
        with_retries(|| async {
            sqlx::query(
                "INSERT INTO feature_cooldowns (user_id, feature, last_used)
                 VALUES (?, ?, ?)
                 ON CONFLICT (user_id, feature) DO UPDATE SET last_used = excluded.last_used",
            )
            .bind(user_id)
            .bind(feature)
            .bind(now)
            .execute(self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn increment_image_quota(&self, user_id: i64, chat_id: i64, day: &str) -> Result<i64> {
        with_retries(|| async {
            sqlx::query(
                "INSERT INTO image_quotas (user_id, chat_id, day, count)
                 VALUES (?, ?, ?, 1)
                 ON CONFLICT (user_id, chat_id, day) DO UPDATE SET count = count + 1",
            )
            .bind(user_id)
            .bind(chat_id)
            .bind(day)
            .execute(self.pool)
            .await?;

            let count: i64 = sqlx::query_scalar(
                "SELECT count FROM image_quotas WHERE user_id = ? AND chat_id = ? AND day = ?",
            )
            .bind(user_id)
            .bind(chat_id)
            .bind(day)
            .fetch_one(self.pool)
            .await?;
            Ok(count)
        })
        .await
    }
}
