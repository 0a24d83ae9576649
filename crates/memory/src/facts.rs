use chrono::Utc;
use sentrybot_retrieval::cosine_similarity;
use sentrybot_store::facts::NewFact;
use sentrybot_store::models::{FactRow, FactScope};
use sentrybot_store::Store;

use crate::embed::EmbedFn;

#[derive(Debug, Clone)]
pub struct FactWrite {
    pub scope: FactScope,
    pub profile_id: i64,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source_type: String,
    pub context_tags: Vec<String>,
    pub decay_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FactOutcome {
    Inserted(i64),
    Reinforced(i64),
}

pub struct FactStore<'a> {
    store: &'a Store,
    dedup_threshold: f32,
    embed_fn: Option<EmbedFn>,
}

impl<'a> FactStore<'a> {
    pub fn new(store: &'a Store, dedup_threshold: f32, embed_fn: Option<EmbedFn>) -> Self {
        Self {
            store,
            dedup_threshold,
            embed_fn,
        }
    }

    /// Writes a fact, deduplicating against active facts in the same
    /// `(scope, profile, category)`: if any existing fact's embedding has
    /// cosine similarity >= the configured threshold, the existing fact is
    /// reinforced (weighted-average confidence, evidence_count++, value
    /// replaced only on strictly higher confidence) instead of duplicated.
    pub async fn remember(&self, write: FactWrite) -> anyhow::Result<FactOutcome> {
        let now = Utc::now().timestamp();
        let embedding = match &self.embed_fn {
            Some(f) => f(write.value.clone()).await,
            None => None,
        };

        if let Some(embedding) = &embedding {
            let existing = self
                .store
                .facts()
                .active_in_category(write.scope, write.profile_id, &write.category)
                .await?;

            if let Some((best_id, _)) = best_match(&existing, embedding, self.dedup_threshold) {
                self.store
                    .facts()
                    .reinforce(best_id, &write.value, write.confidence, now)
                    .await?;
                return Ok(FactOutcome::Reinforced(best_id));
            }
        }

        let embedding_slice = embedding.as_deref();
        let id = self
            .store
            .facts()
            .insert(
                NewFact {
                    scope: write.scope,
                    profile_id: write.profile_id,
                    category: &write.category,
                    key: &write.key,
                    value: &write.value,
                    confidence: write.confidence,
                    source_type: &write.source_type,
                    context_tags: &write.context_tags,
                    embedding: embedding_slice,
                    decay_rate: write.decay_rate,
                },
                now,
            )
            .await?;
        Ok(FactOutcome::Inserted(id))
    }

    pub async fn forget(&self, id: i64) -> anyhow::Result<()> {
        self.store.facts().deactivate(id, Utc::now().timestamp()).await?;
        Ok(())
    }

    pub async fn recall(
        &self,
        scope: FactScope,
        profile_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<FactRow>> {
        Ok(self.store.facts().search_by_profile(scope, profile_id, limit).await?)
    }
}

fn best_match(existing: &[FactRow], embedding: &[f32], threshold: f32) -> Option<(i64, f32)> {
    existing
        .iter()
        .filter_map(|row| row.embedding().map(|e| (row.id, cosine_similarity(embedding, &e))))
        .filter(|(_, sim)| *sim >= threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn embed_fn_returning(vectors: Vec<(&'static str, Vec<f32>)>) -> EmbedFn {
        Arc::new(move |text: String| {
            let found = vectors
                .iter()
                .find(|(key, _)| *key == text)
                .map(|(_, v)| v.clone());
            Box::pin(async move { found })
        })
    }

    #[tokio::test]
    async fn duplicate_value_reinforces_existing_fact() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let profile_id = store.profiles().touch_user(1, 1, None, None, 1000).await.unwrap();

        let embed = embed_fn_returning(vec![
            ("likes pizza", vec![1.0, 0.0]),
            ("loves pizza", vec![0.99, 0.01]),
        ]);
        let facts = FactStore::new(&store, 0.85, Some(embed));

        let first = facts
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "preference".to_string(),
                key: "food".to_string(),
                value: "likes pizza".to_string(),
                confidence: 0.6,
                source_type: "inferred".to_string(),
                context_tags: vec![],
                decay_rate: 0.0,
            })
            .await
            .unwrap();
        assert!(matches!(first, FactOutcome::Inserted(_)));

        let second = facts
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "preference".to_string(),
                key: "food".to_string(),
                value: "loves pizza".to_string(),
                confidence: 0.8,
                source_type: "inferred".to_string(),
                context_tags: vec![],
                decay_rate: 0.0,
            })
            .await
            .unwrap();
        assert!(matches!(second, FactOutcome::Reinforced(_)));

        let recalled = facts.recall(FactScope::User, profile_id, 10).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].evidence_count, 2);
        assert_eq!(recalled[0].value, "loves pizza");
    }

    #[tokio::test]
    async fn dissimilar_value_inserts_new_fact() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let profile_id = store.profiles().touch_user(1, 1, None, None, 1000).await.unwrap();

        let embed = embed_fn_returning(vec![
            ("likes pizza", vec![1.0, 0.0]),
            ("hates mornings", vec![0.0, 1.0]),
        ]);
        let facts = FactStore::new(&store, 0.85, Some(embed));

        facts
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "preference".to_string(),
                key: "food".to_string(),
                value: "likes pizza".to_string(),
                confidence: 0.6,
                source_type: "inferred".to_string(),
                context_tags: vec![],
                decay_rate: 0.0,
            })
            .await
            .unwrap();
        facts
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "preference".to_string(),
                key: "schedule".to_string(),
                value: "hates mornings".to_string(),
                confidence: 0.6,
                source_type: "inferred".to_string(),
                context_tags: vec![],
                decay_rate: 0.0,
            })
            .await
            .unwrap();

        let recalled = facts.recall(FactScope::User, profile_id, 10).await.unwrap();
        assert_eq!(recalled.len(), 2);
    }

    #[tokio::test]
    async fn forget_deactivates_fact() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let profile_id = store.profiles().touch_user(1, 1, None, None, 1000).await.unwrap();
        let facts = FactStore::new(&store, 0.85, None);

        let outcome = facts
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "preference".to_string(),
                key: "food".to_string(),
                value: "likes pizza".to_string(),
                confidence: 0.6,
                source_type: "inferred".to_string(),
                context_tags: vec![],
                decay_rate: 0.0,
            })
            .await
            .unwrap();
        let FactOutcome::Inserted(id) = outcome else {
            panic!("expected insert");
        };

        facts.forget(id).await.unwrap();
        let recalled = facts.recall(FactScope::User, profile_id, 10).await.unwrap();
        assert!(recalled.is_empty());
    }
}
