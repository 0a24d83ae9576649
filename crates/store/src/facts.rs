use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{FactRow, FactScope};
use crate::retry::with_retries;

pub struct FactRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewFact<'a> {
    pub scope: FactScope,
    pub profile_id: i64,
    pub category: &'a str,
    pub key: &'a str,
    pub value: &'a str,
    pub confidence: f64,
    pub source_type: &'a str,
    pub context_tags: &'a [String],
    pub embedding: Option<&'a [f32]>,
    pub decay_rate: f64,
}

impl<'a> FactRepo<'a> {
    pub async fn active_in_category(
        &self,
        scope: FactScope,
        profile_id: i64,
        category: &str,
    ) -> Result<Vec<FactRow>> {
        let rows = sqlx::query_as::<_, FactRow>(
            "SELECT id, scope, profile_id, category, key, value, confidence, evidence_count,
                    source_type, context_tags, embedding_json, decay_rate, last_reinforced,
                    is_active, created_at, updated_at
             FROM facts
             WHERE scope = ? AND profile_id = ? AND category = ? AND is_active = 1",
        )
        .bind(scope.as_str())
        .bind(profile_id)
        .bind(category)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert(&self, fact: NewFact<'_>, now: i64) -> Result<i64> {
        let tags_json = serde_json::to_string(fact.context_tags)?;
        let embedding_json = match fact.embedding {
            Some(e) => Some(serde_json::to_string(e)?),
            None => None,
        };
        with_retries(|| async {
            let id = sqlx::query(
                "INSERT INTO facts
                    (scope, profile_id, category, key, value, confidence, evidence_count,
                     source_type, context_tags, embedding_json, decay_rate, last_reinforced,
                     is_active, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, 1, ?, ?)",
            )
            .bind(fact.scope.as_str())
            .bind(fact.profile_id)
            .bind(fact.category)
            .bind(fact.key)
            .bind(fact.value)
            .bind(fact.confidence)
            .bind(fact.source_type)
            .bind(&tags_json)
            .bind(&embedding_json)
            .bind(fact.decay_rate)
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(self.pool)
            .await?
            .last_insert_rowid();
            Ok(id)
        })
        .await
    }

    /// Reinforces an existing fact: confidence becomes `0.7*old + 0.3*new`
    /// (capped at 1.0), bumped evidence count, value replaced only if the
    /// new confidence is strictly higher. `evidence_count` never decreases.
    pub async fn reinforce(
        &self,
        id: i64,
        new_value: &str,
        new_confidence: f64,
        now: i64,
    ) -> Result<()> {
        with_retries(|| async {
            let row = sqlx::query_as::<_, FactRow>(
                "SELECT id, scope, profile_id, category, key, value, confidence, evidence_count,
                        source_type, context_tags, embedding_json, decay_rate, last_reinforced,
                        is_active, created_at, updated_at
                 FROM facts WHERE id = ?",
            )
            .bind(id)
            .fetch_one(self.pool)
            .await?;

            let blended = (0.7 * row.confidence + 0.3 * new_confidence).min(1.0);
            let value = if new_confidence > row.confidence {
                new_value
            } else {
                row.value.as_str()
            };

            sqlx::query(
                "UPDATE facts
                 SET value = ?, confidence = ?, evidence_count = evidence_count + 1,
                     last_reinforced = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(value)
            .bind(blended)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn deactivate(&self, id: i64, now: i64) -> Result<()> {
        with_retries(|| async {
            sqlx::query("UPDATE facts SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn search_by_profile(
        &self,
        scope: FactScope,
        profile_id: i64,
        limit: i64,
    ) -> Result<Vec<FactRow>> {
        let rows = sqlx::query_as::<_, FactRow>(
            "SELECT id, scope, profile_id, category, key, value, confidence, evidence_count,
                    source_type, context_tags, embedding_json, decay_rate, last_reinforced,
                    is_active, created_at, updated_at
             FROM facts
             WHERE scope = ? AND profile_id = ? AND is_active = 1
             ORDER BY confidence DESC
             LIMIT ?",
        )
        .bind(scope.as_str())
        .bind(profile_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
