use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::SystemPromptRow;
use crate::retry::with_retries;

pub struct PromptRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

impl<'a> PromptRepo<'a> {
    pub async fn active(&self, scope: &str, chat_id: Option<i64>) -> Result<Option<SystemPromptRow>> {
        let row = sqlx::query_as::<_, SystemPromptRow>(
            "SELECT id, scope, chat_id, version, text, is_active, created_at
             FROM system_prompts
             WHERE scope = ? AND chat_id IS ? AND is_active = 1",
        )
        .bind(scope)
        .bind(chat_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts a new version and flips the old active row off in the same
    /// transaction, so at most one row stays active per (scope, chat_id).
    pub async fn set_active(
        &self,
        scope: &str,
        chat_id: Option<i64>,
        text: &str,
        now: i64,
    ) -> Result<i64> {
        with_retries(|| async {
            let mut tx = self.pool.begin().await?;

            let next_version: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM system_prompts
                 WHERE scope = ? AND chat_id IS ?",
            )
            .bind(scope)
            .bind(chat_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE system_prompts SET is_active = 0 WHERE scope = ? AND chat_id IS ?",
            )
            .bind(scope)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

            let id = sqlx::query(
                "INSERT INTO system_prompts (scope, chat_id, version, text, is_active, created_at)
                 VALUES (?, ?, ?, ?, 1, ?)",
            )
            .bind(scope)
            .bind(chat_id)
            .bind(next_version)
            .bind(text)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            tx.commit().await?;
            Ok(id)
        })
        .await
    }

    pub async fn history(&self, scope: &str, chat_id: Option<i64>, limit: i64) -> Result<Vec<SystemPromptRow>> {
        let rows = sqlx::query_as::<_, SystemPromptRow>(
            "SELECT id, scope, chat_id, version, text, is_active, created_at
             FROM system_prompts
             WHERE scope = ? AND chat_id IS ?
             ORDER BY version DESC
             LIMIT ?",
        )
        .bind(scope)
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Rolls back to a prior version by reactivating it.
    pub async fn activate_version(&self, scope: &str, chat_id: Option<i64>, version: i64) -> Result<()> {
        with_retries(|| async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "UPDATE system_prompts SET is_active = 0 WHERE scope = ? AND chat_id IS ?",
            )
            .bind(scope)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE system_prompts SET is_active = 1
                 WHERE scope = ? AND chat_id IS ? AND version = ?",
            )
            .bind(scope)
            .bind(chat_id)
            .bind(version)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
