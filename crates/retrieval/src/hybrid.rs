use chrono::Utc;
use sentrybot_store::models::MessageRow;
use sentrybot_store::Store;

use crate::vector::cosine_similarity;

#[derive(Debug, Clone, Copy)]
pub struct HybridSearchConfig {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub half_life_days: f32,
    pub temporal_weight: f32,
    pub addressed_boost: f32,
    pub candidate_pool: i64,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            half_life_days: 7.0,
            temporal_weight: 1.0,
            addressed_boost: 1.5,
            candidate_pool: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedMessage {
    pub message: MessageRow,
    pub score: f32,
    pub semantic_score: f32,
    pub keyword_score: f32,
}

pub struct HybridSearch<'a> {
    store: &'a Store,
    config: HybridSearchConfig,
}

impl<'a> HybridSearch<'a> {
    pub fn new(store: &'a Store, config: HybridSearchConfig) -> Self {
        Self { store, config }
    }

    /// Combines semantic (cosine-similarity) and keyword (FTS5 bm25) search
    /// over a chat's message history into one ranked list:
    ///
    /// `base = (semantic_w * sem + keyword_w * kw) / (semantic_w + keyword_w)`
    /// `temporal_f = exp(-age_days / half_life_days)`
    /// `importance_f = 1 + sender_count / max_sender_count` (in `[1, 2]`)
    /// `type_boost = addressed_boost` if the message was addressed to the bot, else `1.0`
    /// `score = base * temporal_f^temporal_weight * importance_f * type_boost`
    pub async fn search(
        &self,
        chat_id: i64,
        query_text: &str,
        query_embedding: Option<&[f32]>,
        limit: usize,
    ) -> anyhow::Result<Vec<RankedMessage>> {
        let now_ts = Utc::now().timestamp();

        let semantic_candidates = if let Some(embedding) = query_embedding {
            self.store
                .messages()
                .with_embeddings_since(chat_id, now_ts - 180 * 86_400, self.config.candidate_pool)
                .await?
        } else {
            Vec::new()
        };

        let keyword_hits = self
            .store
            .messages()
            .keyword_search(chat_id, query_text, self.config.candidate_pool)
            .await?;

        let mut semantic_scores: std::collections::HashMap<i64, f32> =
            std::collections::HashMap::new();
        if let Some(query_embedding) = query_embedding {
            for row in &semantic_candidates {
                if let Some(embedding) = row.embedding() {
                    let sim = cosine_similarity(query_embedding, &embedding);
                    semantic_scores.insert(row.id, sim.max(0.0));
                }
            }
        }

        // bm25 in sqlite is "lower is better"; fold into a bounded [0,1] score.
        let mut keyword_scores: std::collections::HashMap<i64, f32> =
            std::collections::HashMap::new();
        for hit in &keyword_hits {
            let score = 1.0 / (1.0 + hit.rank.max(0.0) as f32);
            keyword_scores.insert(hit.id, score);
        }

        let mut all_ids: std::collections::HashSet<i64> =
            semantic_scores.keys().copied().collect();
        all_ids.extend(keyword_scores.keys().copied());

        let mut rows_by_id: std::collections::HashMap<i64, MessageRow> = semantic_candidates
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        for id in keyword_hits.iter().map(|h| h.id) {
            if !rows_by_id.contains_key(&id) {
                if let Some(row) = self.store.messages().get(id).await? {
                    rows_by_id.insert(id, row);
                }
            }
        }

        let ids: Vec<i64> = all_ids.iter().copied().collect();
        let addressed_flags = self.store.messages().addressed_flags(&ids).await?;
        let sender_counts = self.store.messages().sender_message_counts(chat_id).await?;
        let max_sender_count = sender_counts.values().copied().max().unwrap_or(0).max(1);

        let weight_sum = self.config.semantic_weight + self.config.keyword_weight;
        let mut ranked: Vec<RankedMessage> = Vec::new();

        for id in all_ids {
            let Some(row) = rows_by_id.get(&id).cloned() else {
                continue;
            };
            let sem = semantic_scores.get(&id).copied().unwrap_or(0.0);
            let kw = keyword_scores.get(&id).copied().unwrap_or(0.0);

            let base = if weight_sum > 0.0 {
                (self.config.semantic_weight * sem + self.config.keyword_weight * kw) / weight_sum
            } else {
                0.0
            };

            let age_days = ((now_ts - row.ts).max(0) as f32) / 86_400.0;
            let temporal_f = (-age_days / self.config.half_life_days.max(0.01)).exp();

            let sender_count = row
                .user_id
                .and_then(|uid| sender_counts.get(&uid).copied())
                .unwrap_or(0);
            let importance_f = 1.0 + (sender_count as f32 / max_sender_count as f32);

            let type_boost = if addressed_flags.get(&id).copied().unwrap_or(false) {
                self.config.addressed_boost
            } else {
                1.0
            };

            let score = base
                * temporal_f.powf(self.config.temporal_weight)
                * importance_f
                * type_boost;
            ranked.push(RankedMessage {
                message: row,
                score,
                semantic_score: sem,
                keyword_score: kw,
            });
        }

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_store::messages::NewMessage;
    use sentrybot_store::models::MessageRole;

    #[tokio::test]
    async fn combines_semantic_and_keyword_hits() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let id = store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("cats are wonderful pets".to_string()),
                ts: Utc::now().timestamp() - 86_400,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .messages()
            .backfill_embedding(id, &[1.0, 0.0, 0.0])
            .await
            .unwrap();

        store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("completely unrelated".to_string()),
                ts: Utc::now().timestamp() - 86_400,
                ..Default::default()
            })
            .await
            .unwrap();

        let search = HybridSearch::new(&store, HybridSearchConfig::default());
        let ranked = search
            .search(1, "cats pets", Some(&[1.0, 0.0, 0.0]), 5)
            .await
            .unwrap();

        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].message.id, id);
    }

    #[tokio::test]
    async fn older_messages_score_lower_via_temporal_decay() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let now = Utc::now().timestamp();

        let recent_id = store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("shared topic text".to_string()),
                ts: now - 3600,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .messages()
            .backfill_embedding(recent_id, &[1.0, 0.0])
            .await
            .unwrap();

        let old_id = store
            .messages()
            .append(NewMessage {
                chat_id: 1,
                role: Some(MessageRole::User),
                text: Some("shared topic text".to_string()),
                ts: now - 120 * 86_400,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .messages()
            .backfill_embedding(old_id, &[1.0, 0.0])
            .await
            .unwrap();

        let search = HybridSearch::new(&store, HybridSearchConfig::default());
        let ranked = search
            .search(1, "shared topic text", Some(&[1.0, 0.0]), 5)
            .await
            .unwrap();

        let recent_score = ranked.iter().find(|r| r.message.id == recent_id).unwrap().score;
        let old_score = ranked.iter().find(|r| r.message.id == old_id);
        // old message falls outside the 180-day semantic window only if older;
        // here it's within window but should still score lower due to decay.
        if let Some(old) = old_score {
            assert!(recent_score > old.score);
        }
    }
}
