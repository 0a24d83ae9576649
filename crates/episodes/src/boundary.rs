use regex::RegexSet;
use sentrybot_config::EpisodesConfig;
use sentrybot_retrieval::cosine_similarity;

use crate::window::WindowMessage;

/// Topic-marker phrases (English and Ukrainian) that signal a subject
/// change regardless of timing or semantic drift.
const TOPIC_MARKERS: &[&str] = &[
    r"(?i)by the way",
    r"(?i)changing (the )?subject",
    r"(?i)let'?s talk about",
    r"(?i)anyway,?",
    r"(?i)до речі",
    r"(?i)до іншого",
    r"(?i)поговорим про",
    r"(?i)а тепер про",
];

fn marker_set() -> &'static RegexSet {
    static SET: std::sync::OnceLock<RegexSet> = std::sync::OnceLock::new();
    SET.get_or_init(|| RegexSet::new(TOPIC_MARKERS).expect("static marker patterns are valid"))
}

#[derive(Debug, Clone, Copy, Default)]
struct PairSignals {
    temporal: f32,
    marker: f32,
    semantic: f32,
}

fn temporal_signal(gap_secs: i64, config: &EpisodesConfig) -> f32 {
    if gap_secs >= config.long_gap_secs as i64 {
        1.0
    } else if gap_secs >= config.medium_gap_secs as i64 {
        0.7
    } else if gap_secs >= config.short_gap_secs as i64 {
        0.4
    } else {
        0.0
    }
}

fn marker_signal(text: Option<&str>) -> f32 {
    match text {
        Some(t) if marker_set().is_match(t) => 0.8,
        _ => 0.0,
    }
}

fn semantic_signal(a: &WindowMessage, b: &WindowMessage, threshold: f32) -> f32 {
    let enough_tokens = |m: &WindowMessage| {
        m.text
            .as_deref()
            .map(|t| t.split_whitespace().count() >= 3)
            .unwrap_or(false)
    };
    if !enough_tokens(a) || !enough_tokens(b) {
        return 0.0;
    }
    match (&a.embedding, &b.embedding) {
        (Some(ea), Some(eb)) => {
            let sim = cosine_similarity(ea, eb);
            if sim < threshold {
                1.0 - sim
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Computes per-adjacent-pair signals across the window, clusters signals
/// within a 60-second window, and returns the best cluster score (spec
/// §4.H's boundary-detector formula).
pub fn best_cluster_score(messages: &[WindowMessage], config: &EpisodesConfig) -> f32 {
    if messages.len() < 2 {
        return 0.0;
    }

    let mut pair_signals: Vec<(i64, PairSignals)> = Vec::new();
    for pair in messages.windows(2) {
        let [a, b] = pair else { continue };
        let gap = b.ts - a.ts;
        let signals = PairSignals {
            temporal: temporal_signal(gap, config),
            marker: marker_signal(b.text.as_deref()),
            semantic: semantic_signal(a, b, config.semantic_divergence_threshold),
        };
        pair_signals.push((b.ts, signals));
    }

    let mut best_score = 0.0f32;
    for (cluster_ts, _) in &pair_signals {
        let in_cluster: Vec<&PairSignals> = pair_signals
            .iter()
            .filter(|(ts, _)| (ts - cluster_ts).unsigned_abs() <= config.cluster_window_secs)
            .map(|(_, s)| s)
            .collect();

        let max_semantic = in_cluster.iter().map(|s| s.semantic).fold(0.0f32, f32::max);
        let max_temporal = in_cluster.iter().map(|s| s.temporal).fold(0.0f32, f32::max);
        let max_marker = in_cluster.iter().map(|s| s.marker).fold(0.0f32, f32::max);

        let distinct_signal_types = [max_semantic > 0.0, max_temporal > 0.0, max_marker > 0.0]
            .iter()
            .filter(|b| **b)
            .count();

        let mut score = 0.4 * max_semantic + 0.35 * max_temporal + 0.25 * max_marker;
        if distinct_signal_types >= 2 {
            score *= 1.2;
        }
        if distinct_signal_types >= 3 {
            score *= 1.1;
        }
        score = score.min(1.0);

        best_score = best_score.max(score);
    }

    best_score
}

pub fn boundary_detected(messages: &[WindowMessage], config: &EpisodesConfig) -> bool {
    messages.len() >= config.min_messages
        && best_cluster_score(messages, config) >= config.boundary_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64, ts: i64, text: Option<&str>) -> WindowMessage {
        WindowMessage { id, user_id: Some(1), text: text.map(String::from), embedding: None, ts }
    }

    #[test]
    fn long_gap_alone_does_not_meet_default_threshold() {
        let config = EpisodesConfig::default();
        let messages = vec![msg(1, 0, Some("hello there")), msg(2, 4000, Some("hi again"))];
        let score = best_cluster_score(&messages, &config);
        assert!(score < config.boundary_threshold, "single temporal signal alone: {score}");
    }

    #[test]
    fn marker_plus_gap_combine_above_threshold() {
        let config = EpisodesConfig::default();
        let messages: Vec<WindowMessage> = (0..6)
            .map(|i| msg(i, i * 10, Some("chatting about the weather today")))
            .chain(std::iter::once(msg(6, 4100, Some("by the way, changing subject entirely"))))
            .collect();
        assert!(boundary_detected(&messages, &config));
    }

    #[test]
    fn too_few_messages_never_triggers_boundary() {
        let config = EpisodesConfig::default();
        let messages = vec![msg(1, 0, Some("by the way")), msg(2, 4000, Some("changing subject"))];
        assert!(!boundary_detected(&messages, &config));
    }
}
