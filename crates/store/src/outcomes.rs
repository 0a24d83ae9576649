use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::InteractionOutcomeRow;
use crate::retry::with_retries;

pub struct OutcomeRepo<'a> {
    pub(crate) pool: &'a SqlitePool,
}

#[derive(Debug, Clone)]
pub struct NewOutcome<'a> {
    pub bot_profile_id: i64,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub interaction_type: &'a str,
    pub outcome: &'a str,
    pub sentiment_score: Option<f64>,
    pub response_time_ms: Option<i64>,
    pub token_count: Option<i64>,
    pub tools_used: &'a [String],
    pub context_snapshot: Option<&'a str>,
    pub episode_id: Option<i64>,
}

impl<'a> OutcomeRepo<'a> {
    pub async fn insert(&self, outcome: NewOutcome<'_>, now: i64) -> Result<i64> {
        let tools_json = serde_json::to_string(outcome.tools_used)?;
        with_retries(|| async {
            let id = sqlx::query(
                "INSERT INTO bot_interaction_outcomes
                    (bot_profile_id, chat_id, thread_id, message_id, interaction_type, outcome,
                     sentiment_score, response_time_ms, token_count, tools_used, user_reaction,
                     reaction_delay_seconds, context_snapshot, episode_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?)",
            )
            .bind(outcome.bot_profile_id)
            .bind(outcome.chat_id)
            .bind(outcome.thread_id)
            .bind(outcome.message_id)
            .bind(outcome.interaction_type)
            .bind(outcome.outcome)
            .bind(outcome.sentiment_score)
            .bind(outcome.response_time_ms)
            .bind(outcome.token_count)
            .bind(&tools_json)
            .bind(outcome.context_snapshot)
            .bind(outcome.episode_id)
            .bind(now)
            .execute(self.pool)
            .await?
            .last_insert_rowid();
            Ok(id)
        })
        .await
    }

    /// Attaches a detected user reaction to the outcome tied to `message_id`,
    /// refining it from the initial neutral placeholder.
    pub async fn record_reaction(
        &self,
        message_id: i64,
        outcome: &str,
        user_reaction: &str,
        sentiment_score: Option<f64>,
        reaction_delay_seconds: i64,
    ) -> Result<bool> {
        with_retries(|| async {
            let result = sqlx::query(
                "UPDATE bot_interaction_outcomes
                 SET outcome = ?, user_reaction = ?, sentiment_score = COALESCE(?, sentiment_score),
                     reaction_delay_seconds = ?
                 WHERE message_id = ?",
            )
            .bind(outcome)
            .bind(user_reaction)
            .bind(sentiment_score)
            .bind(reaction_delay_seconds)
            .bind(message_id)
            .execute(self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    pub async fn recent_for_bot(
        &self,
        bot_profile_id: i64,
        limit: i64,
    ) -> Result<Vec<InteractionOutcomeRow>> {
        let rows = sqlx::query_as::<_, InteractionOutcomeRow>(
            "SELECT id, bot_profile_id, chat_id, thread_id, message_id, interaction_type, outcome,
                    sentiment_score, response_time_ms, token_count, tools_used, user_reaction,
                    reaction_delay_seconds, context_snapshot, episode_id, created_at
             FROM bot_interaction_outcomes
             WHERE bot_profile_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(bot_profile_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
