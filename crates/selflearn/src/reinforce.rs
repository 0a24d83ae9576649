//! Turns a classified reaction into fact writes against the bot's own
//! `FactScope::Bot` profile, so future context assembly can surface what
//! has and hasn't worked.

use sentrybot_memory::{FactOutcome, FactWrite, MemoryManager};
use sentrybot_store::models::FactScope;

use crate::sentiment::ReactionOutcome;

#[derive(Debug, Clone)]
pub struct TurnContext {
    pub bot_profile_id: i64,
    pub response_time_ms: Option<i64>,
    pub tools_used: Vec<String>,
    pub response_excerpt: String,
}

pub async fn reinforce_from_reaction(
    memory: &MemoryManager,
    outcome: ReactionOutcome,
    ctx: &TurnContext,
    slow_response_ms: i64,
    mistake_decay_rate: f64,
    performance_decay_rate: f64,
) -> anyhow::Result<Vec<FactOutcome>> {
    let mut written = Vec::new();
    let facts = memory.facts();
    let tool_summary = if ctx.tools_used.is_empty() {
        "no_tools".to_string()
    } else {
        ctx.tools_used.join(",")
    };

    match outcome {
        ReactionOutcome::Praised | ReactionOutcome::Positive => {
            let confidence = outcome.confidence();
            written.push(
                facts
                    .remember(FactWrite {
                        scope: FactScope::Bot,
                        profile_id: ctx.bot_profile_id,
                        category: "tool_effectiveness".to_string(),
                        key: tool_summary.clone(),
                        value: format!("response style '{}' was well received", excerpt(&ctx.response_excerpt)),
                        confidence,
                        source_type: "reaction".to_string(),
                        context_tags: ctx.tools_used.clone(),
                        decay_rate: 0.02,
                    })
                    .await?,
            );
        }
        ReactionOutcome::Corrected => {
            written.push(
                facts
                    .remember(FactWrite {
                        scope: FactScope::Bot,
                        profile_id: ctx.bot_profile_id,
                        category: "mistake_pattern".to_string(),
                        key: tool_summary.clone(),
                        value: format!("reply was corrected: '{}'", excerpt(&ctx.response_excerpt)),
                        confidence: outcome.confidence(),
                        source_type: "reaction".to_string(),
                        context_tags: ctx.tools_used.clone(),
                        decay_rate: mistake_decay_rate,
                    })
                    .await?,
            );
        }
        ReactionOutcome::Negative => {
            written.push(
                facts
                    .remember(FactWrite {
                        scope: FactScope::Bot,
                        profile_id: ctx.bot_profile_id,
                        category: "user_interaction".to_string(),
                        key: tool_summary.clone(),
                        value: format!("response poorly received: '{}'", excerpt(&ctx.response_excerpt)),
                        confidence: outcome.confidence(),
                        source_type: "reaction".to_string(),
                        context_tags: ctx.tools_used.clone(),
                        decay_rate: 0.05,
                    })
                    .await?,
            );
        }
        ReactionOutcome::Neutral => {}
    }

    let is_slow = ctx.response_time_ms.map(|ms| ms > slow_response_ms).unwrap_or(false);
    if is_slow && matches!(outcome, ReactionOutcome::Negative | ReactionOutcome::Corrected) {
        written.push(
            facts
                .remember(FactWrite {
                    scope: FactScope::Bot,
                    profile_id: ctx.bot_profile_id,
                    category: "performance_metric".to_string(),
                    key: "slow_response".to_string(),
                    value: format!(
                        "slow reply ({} ms) correlated with a negative reaction",
                        ctx.response_time_ms.unwrap_or_default()
                    ),
                    confidence: 0.6,
                    source_type: "reaction".to_string(),
                    context_tags: vec![],
                    decay_rate: performance_decay_rate,
                })
                .await?,
        );
    }

    Ok(written)
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 80;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_CHARS).collect::<String>() + "…"
    }
}
