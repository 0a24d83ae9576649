use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{FtsHit, MessageRole, MessageRow};
use crate::retry::with_retries;

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub user_id: Option<i64>,
    pub role: Option<MessageRole>,
    pub text: Option<String>,
    pub media_json: Option<String>,
    pub ts: i64,
    pub telegram_message_id: Option<i64>,
    pub addressed: bool,
    pub reply_to_message_id: Option<i64>,
    pub media_group_id: Option<String>,
}

pub struct MessageRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

impl<'a> MessageRepo<'a> {
    /// Inserts a message and its addressing metadata in one transaction, then
    /// lets the `messages_ai` trigger keep `messages_fts` in sync.
    pub async fn append(&self, msg: NewMessage) -> Result<i64> {
        with_retries(|| async {
            let mut tx = self.pool.begin().await?;

            let role = msg.role.unwrap_or(MessageRole::User);
            let id = sqlx::query(
                "INSERT INTO messages (chat_id, thread_id, user_id, role, text, media_json, ts)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(msg.chat_id)
            .bind(msg.thread_id)
            .bind(msg.user_id)
            .bind(role.as_str())
            .bind(&msg.text)
            .bind(&msg.media_json)
            .bind(msg.ts)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            sqlx::query(
                "INSERT INTO message_metadata
                    (message_id, telegram_message_id, addressed, reply_to_message_id, media_group_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(msg.telegram_message_id)
            .bind(msg.addressed)
            .bind(msg.reply_to_message_id)
            .bind(&msg.media_group_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(id)
        })
        .await
    }

    pub async fn backfill_embedding(&self, message_id: i64, embedding: &[f32]) -> Result<()> {
        let json = serde_json::to_string(embedding)?;
        with_retries(|| async {
            sqlx::query("UPDATE messages SET embedding_json = ? WHERE id = ?")
                .bind(&json)
                .bind(message_id)
                .execute(self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn recent(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, thread_id, user_id, role, text, media_json, embedding_json, ts
             FROM messages
             WHERE chat_id = ? AND (thread_id IS ? OR thread_id = ?)
             ORDER BY ts DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(thread_id)
        .bind(thread_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn with_embeddings_since(
        &self,
        chat_id: i64,
        since_ts: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, thread_id, user_id, role, text, media_json, embedding_json, ts
             FROM messages
             WHERE chat_id = ? AND ts >= ? AND embedding_json IS NOT NULL
             ORDER BY ts DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(since_ts)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Full-text search via the FTS5 shadow table, ranked by bm25.
    pub async fn keyword_search(
        &self,
        chat_id: i64,
        query: &str,
        limit: i64,
    ) -> Result<Vec<FtsHit>> {
        let escaped = escape_fts5_query(query);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FtsHit>(
            "SELECT m.id as id, bm25(messages_fts) as rank
             FROM messages_fts
             JOIN messages m ON m.id = messages_fts.rowid
             WHERE messages_fts MATCH ? AND m.chat_id = ?
             ORDER BY rank
             LIMIT ?",
        )
        .bind(&escaped)
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> Result<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, thread_id, user_id, role, text, media_json, embedding_json, ts
             FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Looks up the message recorded at ingest time under a given chat's
    /// `telegram_message_id`, used to pull a replied-to message into context.
    pub async fn by_telegram_message_id(
        &self,
        chat_id: i64,
        telegram_message_id: i64,
    ) -> Result<Option<MessageRow>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT m.id, m.chat_id, m.thread_id, m.user_id, m.role, m.text, m.media_json,
                    m.embedding_json, m.ts
             FROM messages m
             JOIN message_metadata mm ON mm.message_id = m.id
             WHERE m.chat_id = ? AND mm.telegram_message_id = ?",
        )
        .bind(chat_id)
        .bind(telegram_message_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Looks up the `addressed` flag recorded at ingest time for each of the
    /// given message ids, used by hybrid retrieval's `type_boost` term.
    pub async fn addressed_flags(
        &self,
        ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, bool>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT message_id, addressed FROM message_metadata WHERE message_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, (i64, bool)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    /// Per-sender message counts for a chat, used by hybrid retrieval's
    /// `importance_f` term (`1 + sender_count / max_count`, in `[1, 2]`).
    pub async fn sender_message_counts(
        &self,
        chat_id: i64,
    ) -> Result<std::collections::HashMap<i64, i64>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT user_id, COUNT(*) as cnt FROM messages
             WHERE chat_id = ? AND user_id IS NOT NULL
             GROUP BY user_id",
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

/// Wraps each whitespace-split token in double quotes (after stripping any
/// embedded quotes) and joins with `OR`, so punctuation and FTS5 operator
/// characters in user text can't break the query.
pub fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.replace('"', ""))
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{word}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_joins_with_or() {
        let escaped = escape_fts5_query("hello \"world\" foo");
        assert_eq!(escaped, "\"hello\" OR \"world\" OR \"foo\"");
    }

    #[test]
    fn empty_query_escapes_to_empty() {
        assert_eq!(escape_fts5_query("   "), "");
    }
}
