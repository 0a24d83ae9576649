use sentrybot_retrieval::cosine_similarity;
use sentrybot_store::models::EpisodeRow;
use sentrybot_store::Store;

#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: EpisodeRow,
    pub score: f64,
}

fn tag_overlap(query_keywords: &[String], tags: &[String]) -> f64 {
    if query_keywords.is_empty() || tags.is_empty() {
        return 0.0;
    }
    let query_set: std::collections::HashSet<String> =
        query_keywords.iter().map(|k| k.to_lowercase()).collect();
    let tag_set: std::collections::HashSet<String> =
        tags.iter().map(|t| t.to_lowercase()).collect();
    let overlap = query_set.intersection(&tag_set).count();
    overlap as f64 / query_set.len() as f64
}

/// Retrieves episodes relevant to `user_id` in `chat_id`, scored by
/// `0.6*semantic + 0.3*tag_overlap + 0.1*importance` (spec §4.H), recording
/// access on each returned episode.
pub async fn retrieve_relevant_episodes(
    store: &Store,
    chat_id: i64,
    user_id: i64,
    query_embedding: Option<&[f32]>,
    query_keywords: &[String],
    min_importance: f64,
    k: usize,
    now: i64,
) -> anyhow::Result<Vec<ScoredEpisode>> {
    let candidates = store.episodes().all_for_chat_with_embedding(chat_id).await?;

    let mut scored: Vec<ScoredEpisode> = candidates
        .into_iter()
        .filter(|ep| ep.importance >= min_importance)
        .filter(|ep| ep.participant_id_list().contains(&user_id))
        .map(|ep| {
            let semantic = match (query_embedding, ep.embedding()) {
                (Some(q), Some(e)) => cosine_similarity(q, &e) as f64,
                _ => 0.0,
            };
            let tags: Vec<String> = serde_json::from_str(&ep.tags).unwrap_or_default();
            let tag_score = tag_overlap(query_keywords, &tags);
            let score = 0.6 * semantic + 0.3 * tag_score + 0.1 * ep.importance;
            ScoredEpisode { episode: ep, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    for scored_episode in &scored {
        store.episodes().record_access(scored_episode.episode.id, now).await?;
    }

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_store::episodes::NewEpisode;

    #[tokio::test]
    async fn filters_by_participant_and_importance() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .episodes()
            .insert(
                NewEpisode {
                    chat_id: 1,
                    thread_id: None,
                    topic: "cats",
                    summary: "talked about cats",
                    summary_embedding: Some(&[1.0, 0.0]),
                    importance: 0.8,
                    emotional_valence: "positive",
                    message_ids: &[1, 2],
                    participant_ids: &[7],
                    tags: &["pets".to_string()],
                },
                1000,
            )
            .await
            .unwrap();
        store
            .episodes()
            .insert(
                NewEpisode {
                    chat_id: 1,
                    thread_id: None,
                    topic: "unrelated",
                    summary: "unrelated",
                    summary_embedding: None,
                    importance: 0.1,
                    emotional_valence: "neutral",
                    message_ids: &[3],
                    participant_ids: &[9],
                    tags: &[],
                },
                1000,
            )
            .await
            .unwrap();

        let results = retrieve_relevant_episodes(
            &store,
            1,
            7,
            Some(&[1.0, 0.0]),
            &["pets".to_string()],
            0.0,
            5,
            2000,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].episode.topic, "cats");
    }
}
