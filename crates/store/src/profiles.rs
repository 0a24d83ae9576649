use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::UserProfileRow;
use crate::retry::with_retries;

pub struct ProfileRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

impl<'a> ProfileRepo<'a> {
    /// Creates the profile lazily on first observed message, else bumps
    /// `interaction_count`/`last_seen` on the existing row.
    pub async fn touch_user(
        &self,
        user_id: i64,
        chat_id: i64,
        display_name: Option<&str>,
        username: Option<&str>,
        now: i64,
    ) -> Result<i64> {
        with_retries(|| async {
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM user_profiles WHERE user_id = ? AND chat_id = ?",
            )
            .bind(user_id)
            .bind(chat_id)
            .fetch_optional(self.pool)
            .await?;

            if let Some(id) = existing {
                sqlx::query(
                    "UPDATE user_profiles
                     SET interaction_count = interaction_count + 1,
                         last_seen = ?,
                         display_name = COALESCE(?, display_name),
                         username = COALESCE(?, username),
                         updated_at = ?
                     WHERE id = ?",
                )
                .bind(now)
                .bind(display_name)
                .bind(username)
                .bind(now)
                .bind(id)
                .execute(self.pool)
                .await?;
                Ok(id)
            } else {
                let id = sqlx::query(
                    "INSERT INTO user_profiles
                        (user_id, chat_id, display_name, username, interaction_count,
                         last_seen, summary, summary_version, membership_status,
                         created_at, updated_at)
                     VALUES (?, ?, ?, ?, 1, ?, NULL, 0, 'active', ?, ?)",
                )
                .bind(user_id)
                .bind(chat_id)
                .bind(display_name)
                .bind(username)
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(self.pool)
                .await?
                .last_insert_rowid();
                Ok(id)
            }
        })
        .await
    }

    pub async fn get(&self, user_id: i64, chat_id: i64) -> Result<Option<UserProfileRow>> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            "SELECT id, user_id, chat_id, display_name, username, interaction_count,
                    last_seen, summary, summary_version, membership_status, created_at, updated_at
             FROM user_profiles WHERE user_id = ? AND chat_id = ?",
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_by_chat(&self, chat_id: i64, limit: i64) -> Result<Vec<UserProfileRow>> {
        let rows = sqlx::query_as::<_, UserProfileRow>(
            "SELECT id, user_id, chat_id, display_name, username, interaction_count,
                    last_seen, summary, summary_version, membership_status, created_at, updated_at
             FROM user_profiles
             WHERE chat_id = ?
             ORDER BY last_seen DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn stale_summaries(&self, older_than: i64, limit: i64) -> Result<Vec<UserProfileRow>> {
        let rows = sqlx::query_as::<_, UserProfileRow>(
            "SELECT id, user_id, chat_id, display_name, username, interaction_count,
                    last_seen, summary, summary_version, membership_status, created_at, updated_at
             FROM user_profiles
             WHERE updated_at < ?
             ORDER BY updated_at ASC
             LIMIT ?",
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_summary(&self, id: i64, summary: &str, now: i64) -> Result<()> {
        with_retries(|| async {
            sqlx::query(
                "UPDATE user_profiles
                 SET summary = ?, summary_version = summary_version + 1, updated_at = ?
                 WHERE id = ?",
            )
            .bind(summary)
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn touch_chat(&self, chat_id: i64, title: Option<&str>, now: i64) -> Result<i64> {
        with_retries(|| async {
            let existing =
                sqlx::query_scalar::<_, i64>("SELECT id FROM chat_profiles WHERE chat_id = ?")
                    .bind(chat_id)
                    .fetch_optional(self.pool)
                    .await?;

            if let Some(id) = existing {
                if let Some(title) = title {
                    sqlx::query("UPDATE chat_profiles SET title = ?, updated_at = ? WHERE id = ?")
                        .bind(title)
                        .bind(now)
                        .bind(id)
                        .execute(self.pool)
                        .await?;
                }
                Ok(id)
            } else {
                let id = sqlx::query(
                    "INSERT INTO chat_profiles (chat_id, title, summary, created_at, updated_at)
                     VALUES (?, ?, NULL, ?, ?)",
                )
                .bind(chat_id)
                .bind(title)
                .bind(now)
                .bind(now)
                .execute(self.pool)
                .await?
                .last_insert_rowid();
                Ok(id)
            }
        })
        .await
    }

    /// The bot has exactly one profile per chat; this is "just another
    /// profile scope" for the fact store, per the bot-self-learning design.
    pub async fn ensure_bot_profile(&self, chat_id: i64, now: i64) -> Result<i64> {
        with_retries(|| async {
            let existing =
                sqlx::query_scalar::<_, i64>("SELECT id FROM bot_profiles WHERE chat_id = ?")
                    .bind(chat_id)
                    .fetch_optional(self.pool)
                    .await?;
            if let Some(id) = existing {
                return Ok(id);
            }
            let id = sqlx::query(
                "INSERT INTO bot_profiles (chat_id, created_at, updated_at) VALUES (?, ?, ?)",
            )
            .bind(chat_id)
            .bind(now)
            .bind(now)
            .execute(self.pool)
            .await?
            .last_insert_rowid();
            Ok(id)
        })
        .await
    }
}
