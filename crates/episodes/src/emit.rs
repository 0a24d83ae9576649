use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sentrybot_store::episodes::NewEpisode;
use sentrybot_store::Store;

use crate::window::ConversationWindow;

/// Produces an embedding for a piece of text; kept abstract so this crate
/// doesn't depend on the LLM gateway directly.
pub type EmbedFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<Vec<f32>>> + Send>> + Send + Sync>;

/// Optional LLM-generated episode summary: topic, summary text, emotional
/// valence, and tags. When absent or rate-limited, emission falls back to
/// the heuristic topic/summary below.
pub struct GeneratedSummary {
    pub topic: String,
    pub summary: String,
    pub valence: String,
    pub tags: Vec<String>,
}

pub type SummarizeFn = Arc<
    dyn Fn(Vec<String>) -> Pin<Box<dyn Future<Output = Option<GeneratedSummary>> + Send>>
        + Send
        + Sync,
>;

/// Fast heuristic topic: the window's first message text truncated to 50
/// characters with an ellipsis suffix if it was cut.
pub fn heuristic_topic(window: &ConversationWindow) -> String {
    let first_text = window
        .messages
        .first()
        .and_then(|m| m.text.as_deref())
        .unwrap_or("conversation");
    truncate_with_ellipsis(first_text, 50)
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

fn band(value: usize, bands: &[usize]) -> f64 {
    let step = 1.0 / bands.len() as f64;
    let mut score = 0.0;
    for (i, threshold) in bands.iter().enumerate() {
        if value >= *threshold {
            score = (i + 1) as f64 * step;
        }
    }
    score.min(1.0)
}

/// Importance heuristic in `[0,1]` from message count, participant count,
/// and duration bands (spec §4.H).
pub fn heuristic_importance(window: &ConversationWindow) -> f64 {
    let message_band = band(window.messages.len(), &[5, 10, 20]);
    let participant_band = band(window.participant_ids.len(), &[2, 3]);
    let duration_secs = window
        .messages
        .last()
        .zip(window.messages.first())
        .map(|(last, first)| (last.ts - first.ts).max(0))
        .unwrap_or(0);
    let duration_minutes = duration_secs as f64 / 60.0;
    let duration_band = if duration_minutes >= 30.0 {
        1.0
    } else if duration_minutes >= 10.0
    {
        0.66
    } else if duration_minutes >= 5.0 {
        0.33
    } else {
        0.0
    };

    ((message_band + participant_band + duration_band) / 3.0).min(1.0)
}

/// Closes a window into a persisted episode: picks topic/summary/valence via
/// the optional summarizer (falling back to heuristics), computes importance,
/// embeds the summary if possible, and inserts it.
pub async fn emit_episode(
    store: &Store,
    chat_id: i64,
    thread_id: Option<i64>,
    window: &ConversationWindow,
    summarize: Option<&SummarizeFn>,
    embed: Option<&EmbedFn>,
    now: i64,
) -> anyhow::Result<i64> {
    let texts: Vec<String> = window
        .messages
        .iter()
        .filter_map(|m| m.text.clone())
        .collect();

    let generated = match summarize {
        Some(f) => f(texts).await,
        None => None,
    };

    let (topic, summary, valence, tags) = match generated {
        Some(g) => (g.topic, g.summary, g.valence, g.tags),
        None => {
            let topic = heuristic_topic(window);
            (topic.clone(), topic, "neutral".to_string(), Vec::new())
        }
    };

    let importance = heuristic_importance(window);

    let embedding = match embed {
        Some(f) => f(summary.clone()).await,
        None => None,
    };

    let message_ids: Vec<i64> = window.messages.iter().map(|m| m.id).collect();
    let participant_ids: Vec<i64> = window.participant_ids.iter().copied().collect();

    let id = store
        .episodes()
        .insert(
            NewEpisode {
                chat_id,
                thread_id,
                topic: &topic,
                summary: &summary,
                summary_embedding: embedding.as_deref(),
                importance,
                emotional_valence: &valence,
                message_ids: &message_ids,
                participant_ids: &participant_ids,
                tags: &tags,
            },
            now,
        )
        .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowMessage;

    fn sample_window() -> ConversationWindow {
        let mut window = ConversationWindow::default();
        for i in 0..6 {
            window.push(WindowMessage {
                id: i,
                user_id: Some(1),
                text: Some(format!("message number {i} about cats")),
                embedding: None,
                ts: i * 60,
            });
        }
        window
    }

    #[test]
    fn heuristic_topic_truncates_long_text() {
        let mut window = ConversationWindow::default();
        window.push(WindowMessage {
            id: 1,
            user_id: Some(1),
            text: Some("a".repeat(80)),
            embedding: None,
            ts: 0,
        });
        let topic = heuristic_topic(&window);
        assert_eq!(topic.chars().count(), 51);
        assert!(topic.ends_with('…'));
    }

    #[test]
    fn importance_increases_with_activity() {
        let small = {
            let mut w = ConversationWindow::default();
            w.push(WindowMessage { id: 1, user_id: Some(1), text: None, embedding: None, ts: 0 });
            w
        };
        let big = sample_window();
        assert!(heuristic_importance(&big) >= heuristic_importance(&small));
    }

    #[tokio::test]
    async fn emit_episode_persists_with_heuristic_fallback() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let window = sample_window();
        let id = emit_episode(&store, 1, None, &window, None, None, 1000).await.unwrap();
        let episodes = store.episodes().recent_for_chat(1, 10).await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].id, id);
    }
}
