use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::EpisodeRow;
use crate::retry::with_retries;

pub struct EpisodeRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewEpisode<'a> {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub topic: &'a str,
    pub summary: &'a str,
    pub summary_embedding: Option<&'a [f32]>,
    pub importance: f64,
    pub emotional_valence: &'a str,
    pub message_ids: &'a [i64],
    pub participant_ids: &'a [i64],
    pub tags: &'a [String],
}

impl<'a> EpisodeRepo<'a> {
    pub async fn insert(&self, episode: NewEpisode<'_>, now: i64) -> Result<i64> {
        let message_ids_json = serde_json::to_string(episode.message_ids)?;
        let participant_ids_json = serde_json::to_string(episode.participant_ids)?;
        let tags_json = serde_json::to_string(episode.tags)?;
        let embedding_json = match episode.summary_embedding {
            Some(e) => Some(serde_json::to_string(e)?),
            None => None,
        };

        with_retries(|| async {
            let id = sqlx::query(
                "INSERT INTO episodes
                    (chat_id, thread_id, topic, summary, summary_embedding_json, importance,
                     emotional_valence, message_ids, participant_ids, tags, created_at,
                     last_accessed, access_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0)",
            )
            .bind(episode.chat_id)
            .bind(episode.thread_id)
            .bind(episode.topic)
            .bind(episode.summary)
            .bind(&embedding_json)
            .bind(episode.importance)
            .bind(episode.emotional_valence)
            .bind(&message_ids_json)
            .bind(&participant_ids_json)
            .bind(&tags_json)
            .bind(now)
            .execute(self.pool)
            .await?
            .last_insert_rowid();
            Ok(id)
        })
        .await
    }

    pub async fn recent_for_chat(&self, chat_id: i64, limit: i64) -> Result<Vec<EpisodeRow>> {
        let rows = sqlx::query_as::<_, EpisodeRow>(
            "SELECT id, chat_id, thread_id, topic, summary, summary_embedding_json, importance,
                    emotional_valence, message_ids, participant_ids, tags, created_at,
                    last_accessed, access_count
             FROM episodes
             WHERE chat_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn all_for_chat_with_embedding(&self, chat_id: i64) -> Result<Vec<EpisodeRow>> {
        let rows = sqlx::query_as::<_, EpisodeRow>(
            "SELECT id, chat_id, thread_id, topic, summary, summary_embedding_json, importance,
                    emotional_valence, message_ids, participant_ids, tags, created_at,
                    last_accessed, access_count
             FROM episodes
             WHERE chat_id = ? AND summary_embedding_json IS NOT NULL",
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn record_access(&self, id: i64, now: i64) -> Result<()> {
        with_retries(|| async {
            sqlx::query(
                "UPDATE episodes SET last_accessed = ?, access_count = access_count + 1
                 WHERE id = ?",
            )
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
