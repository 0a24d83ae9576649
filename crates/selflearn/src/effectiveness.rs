//! Recent-effectiveness summary: a weighted mix of outcome labels over a
//! trailing window, used to gauge whether the bot has been landing well
//! lately.

use sentrybot_store::models::InteractionOutcomeRow;

use crate::sentiment::ReactionOutcome;

#[derive(Debug, Clone, Default)]
pub struct EffectivenessSummary {
    pub sample_size: usize,
    pub recent_effectiveness: f64,
    pub praised_count: usize,
    pub corrected_count: usize,
    pub negative_count: usize,
}

fn weight_for(outcome: &str) -> Option<f64> {
    match outcome {
        "praised" => Some(ReactionOutcome::Praised.effectiveness_weight()),
        "positive" => Some(ReactionOutcome::Positive.effectiveness_weight()),
        "neutral" => Some(ReactionOutcome::Neutral.effectiveness_weight()),
        "negative" => Some(ReactionOutcome::Negative.effectiveness_weight()),
        "corrected" => Some(ReactionOutcome::Corrected.effectiveness_weight()),
        "ignored" => Some(0.0),
        _ => None,
    }
}

/// `rows` must already be restricted to the reaction outcomes within the
/// desired window (`created_at >= now - days*86400`); this function does
/// the weighting, not the windowing.
pub fn summarize(rows: &[InteractionOutcomeRow]) -> EffectivenessSummary {
    let reactions: Vec<&InteractionOutcomeRow> = rows
        .iter()
        .filter(|r| r.interaction_type == "user_reaction")
        .collect();

    if reactions.is_empty() {
        return EffectivenessSummary::default();
    }

    let mut total_weight = 0.0;
    let mut praised_count = 0;
    let mut corrected_count = 0;
    let mut negative_count = 0;

    for row in &reactions {
        if let Some(w) = weight_for(&row.outcome) {
            total_weight += w;
        }
        match row.outcome.as_str() {
            "praised" => praised_count += 1,
            "corrected" => corrected_count += 1,
            "negative" => negative_count += 1,
            _ => {}
        }
    }

    EffectivenessSummary {
        sample_size: reactions.len(),
        recent_effectiveness: total_weight / reactions.len() as f64,
        praised_count,
        corrected_count,
        negative_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(outcome: &str, interaction_type: &str) -> InteractionOutcomeRow {
        InteractionOutcomeRow {
            id: 0,
            bot_profile_id: 1,
            chat_id: 1,
            thread_id: None,
            message_id: 1,
            interaction_type: interaction_type.to_string(),
            outcome: outcome.to_string(),
            sentiment_score: None,
            response_time_ms: None,
            token_count: None,
            tools_used: "[]".to_string(),
            user_reaction: None,
            reaction_delay_seconds: None,
            context_snapshot: None,
            episode_id: None,
            created_at: 0,
        }
    }

    #[test]
    fn all_praised_gives_effectiveness_one() {
        let rows = vec![row("praised", "user_reaction"), row("praised", "user_reaction")];
        let summary = summarize(&rows);
        assert_eq!(summary.recent_effectiveness, 1.0);
        assert_eq!(summary.praised_count, 2);
    }

    #[test]
    fn neutral_placeholder_rows_are_excluded() {
        let rows = vec![row("neutral", "reply"), row("praised", "user_reaction")];
        let summary = summarize(&rows);
        assert_eq!(summary.sample_size, 1);
        assert_eq!(summary.recent_effectiveness, 1.0);
    }

    #[test]
    fn mixed_outcomes_average_their_weights() {
        let rows = vec![
            row("praised", "user_reaction"),
            row("corrected", "user_reaction"),
        ];
        let summary = summarize(&rows);
        assert!((summary.recent_effectiveness - 0.55).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_default_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.sample_size, 0);
        assert_eq!(summary.recent_effectiveness, 0.0);
    }
}
