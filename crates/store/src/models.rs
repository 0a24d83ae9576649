use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
            MessageRole::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "model" => MessageRole::Model,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub user_id: Option<i64>,
    pub role: String,
    pub text: Option<String>,
    pub media_json: Option<String>,
    pub embedding_json: Option<String>,
    pub ts: i64,
}

impl MessageRow {
    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.embedding_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FtsHit {
    pub id: i64,
    pub rank: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfileRow {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub interaction_count: i64,
    pub last_seen: Option<i64>,
    pub summary: Option<String>,
    pub summary_version: i64,
    pub membership_status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactScope {
    User,
    Chat,
    Bot,
}

impl FactScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactScope::User => "user",
            FactScope::Chat => "chat",
            FactScope::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FactRow {
    pub id: i64,
    pub scope: String,
    pub profile_id: i64,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub evidence_count: i64,
    pub source_type: String,
    pub context_tags: String,
    pub embedding_json: Option<String>,
    pub decay_rate: f64,
    pub last_reinforced: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FactRow {
    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.embedding_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// `confidence * exp(-decay_rate * age_days)`, per the fact decay invariant.
    pub fn effective_confidence(&self, now_ts: i64) -> f64 {
        if self.decay_rate <= 0.0 {
            return self.confidence;
        }
        let age_days = ((now_ts - self.last_reinforced).max(0) as f64) / 86_400.0;
        self.confidence * (-self.decay_rate * age_days).exp()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EpisodeRow {
    pub id: i64,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub topic: String,
    pub summary: String,
    pub summary_embedding_json: Option<String>,
    pub importance: f64,
    pub emotional_valence: String,
    pub message_ids: String,
    pub participant_ids: String,
    pub tags: String,
    pub created_at: i64,
    pub last_accessed: Option<i64>,
    pub access_count: i64,
}

impl EpisodeRow {
    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.summary_embedding_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn message_id_list(&self) -> Vec<i64> {
        serde_json::from_str(&self.message_ids).unwrap_or_default()
    }

    pub fn participant_id_list(&self) -> Vec<i64> {
        serde_json::from_str(&self.participant_ids).unwrap_or_default()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SystemPromptRow {
    pub id: i64,
    pub scope: String,
    pub chat_id: Option<i64>,
    pub version: i64,
    pub text: String,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionOutcomeKind {
    Praised,
    Positive,
    Neutral,
    Negative,
    Corrected,
    Ignored,
}

impl InteractionOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionOutcomeKind::Praised => "praised",
            InteractionOutcomeKind::Positive => "positive",
            InteractionOutcomeKind::Neutral => "neutral",
            InteractionOutcomeKind::Negative => "negative",
            InteractionOutcomeKind::Corrected => "corrected",
            InteractionOutcomeKind::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InteractionOutcomeRow {
    pub id: i64,
    pub bot_profile_id: i64,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub interaction_type: String,
    pub outcome: String,
    pub sentiment_score: Option<f64>,
    pub response_time_ms: Option<i64>,
    pub token_count: Option<i64>,
    pub tools_used: String,
    pub user_reaction: Option<String>,
    pub reaction_delay_seconds: Option<i64>,
    pub context_snapshot: Option<String>,
    pub episode_id: Option<i64>,
    pub created_at: i64,
}
