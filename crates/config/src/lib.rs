use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub telegram_bot_token: String,
    pub gemini_api_keys: Vec<String>,
    pub admin_user_ids: Vec<i64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            gemini_api_keys: Vec::new(),
            admin_user_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub generation_model: String,
    pub embedding_model: String,
    pub max_tool_rounds: u32,
    pub generation_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            generation_model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            max_tool_rounds: 2,
            generation_timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub per_user_per_hour: u32,
    pub window_seconds: u64,
    pub suppression_cooldown_seconds: u64,
    pub daily_image_quota: u32,
    pub embedding_concurrency: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_user_per_hour: 20,
            window_seconds: 3600,
            suppression_cooldown_seconds: 600,
            daily_image_quota: 5,
            embedding_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub token_budget: usize,
    pub immediate_budget: usize,
    pub recent_budget: usize,
    pub relevant_budget: usize,
    pub background_budget: usize,
    pub episodic_budget: usize,
    pub l1_cache_capacity: usize,
    pub l1_cache_ttl_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 8000,
            immediate_budget: 1500,
            recent_budget: 2000,
            relevant_budget: 2500,
            background_budget: 1500,
            episodic_budget: 500,
            l1_cache_capacity: 100,
            l1_cache_ttl_secs: 75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodesConfig {
    pub min_messages: usize,
    pub max_messages_per_window: usize,
    pub window_timeout_secs: u64,
    pub long_gap_secs: u64,
    pub medium_gap_secs: u64,
    pub short_gap_secs: u64,
    pub cluster_window_secs: u64,
    pub semantic_divergence_threshold: f32,
    pub boundary_threshold: f32,
    pub monitor_check_interval_secs: u64,
    pub monitor_batch_delay_millis: u64,
    pub summarization_rate_per_minute: u32,
    pub min_importance_for_retrieval: f64,
}

impl Default for EpisodesConfig {
    fn default() -> Self {
        Self {
            min_messages: 5,
            max_messages_per_window: 50,
            window_timeout_secs: 1800,
            long_gap_secs: 3600,
            medium_gap_secs: 900,
            short_gap_secs: 120,
            cluster_window_secs: 60,
            semantic_divergence_threshold: 0.5,
            boundary_threshold: 0.6,
            monitor_check_interval_secs: 300,
            monitor_batch_delay_millis: 100,
            summarization_rate_per_minute: 1,
            min_importance_for_retrieval: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub dedup_threshold: f32,
    pub fact_decay_enabled: bool,
    pub summary_stale_hours: u64,
    pub max_facts_in_prompt: usize,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.85,
            fact_decay_enabled: true,
            summary_stale_hours: 24,
            max_facts_in_prompt: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfLearnConfig {
    pub mistake_decay_rate: f64,
    pub performance_decay_rate: f64,
    pub slow_response_ms: i64,
    pub effectiveness_window_days: i64,
    pub insight_generation_enabled: bool,
}

impl Default for SelfLearnConfig {
    fn default() -> Self {
        Self {
            mistake_decay_rate: 0.1,
            performance_decay_rate: 0.05,
            slow_response_ms: 5000,
            effectiveness_window_days: 7,
            insight_generation_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Global,
    Whitelist,
    Blacklist,
}

impl Default for ChatMode {
    fn default() -> Self {
        ChatMode::Global
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub chat_mode: ChatMode,
    pub whitelist_chat_ids: Vec<i64>,
    pub blacklist_chat_ids: Vec<i64>,
    pub require_mention: bool,
    pub bot_name_variants: Vec<String>,
    pub trigger_keywords: Vec<String>,
    pub reaction_timeout_secs: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            chat_mode: ChatMode::Global,
            whitelist_chat_ids: Vec::new(),
            blacklist_chat_ids: Vec::new(),
            require_mention: true,
            bot_name_variants: Vec::new(),
            trigger_keywords: Vec::new(),
            reaction_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub processing_lock_ttl_secs: u64,
    pub album_cache_ttl_secs: u64,
    pub album_sibling_wait_millis: u64,
    pub media_download_retries: u32,
    pub media_backoff_millis: Vec<u64>,
    pub image_resize_max_bytes: u64,
    pub image_resize_max_dimension: u32,
    pub image_resize_quality: u8,
    pub max_inline_payload_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            processing_lock_ttl_secs: 300,
            album_cache_ttl_secs: 30,
            album_sibling_wait_millis: 1500,
            media_download_retries: 3,
            media_backoff_millis: vec![500, 1000, 2000],
            image_resize_max_bytes: 1024 * 1024,
            image_resize_max_dimension: 1600,
            image_resize_quality: 80,
            max_inline_payload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub log_level: String,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_cooldown_secs: u64,
}

impl Default for OperationalConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sentrybot.db".to_string(),
            redis_url: None,
            log_level: "info".to_string(),
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub model: ModelConfig,
    pub limits: LimitsConfig,
    pub context: ContextConfig,
    pub episodes: EpisodesConfig,
    pub profiles: ProfilesConfig,
    pub filter: FilterConfig,
    pub ingest: IngestConfig,
    pub selflearn: SelfLearnConfig,
    pub operational: OperationalConfig,
}

impl AppConfig {
    /// Loads config from a TOML file if present, else defaults, then layers
    /// secrets from the environment (via `.env` if present) on top.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.auth.telegram_bot_token = token;
            }
        }
        if let Ok(keys) = env::var("GEMINI_API_KEYS") {
            let parsed: Vec<String> = keys
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.auth.gemini_api_keys = parsed;
            }
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.operational.database_url = url;
            }
        }
        if let Ok(url) = env::var("REDIS_URL") {
            if !url.is_empty() {
                config.operational.redis_url = Some(url);
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.auth.admin_user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let config = AppConfig::default();
        assert_eq!(config.limits.window_seconds, 3600);
        assert_eq!(config.limits.suppression_cooldown_seconds, 600);
    }

    #[test]
    fn load_from_missing_path_falls_back_to_default() {
        let config = AppConfig::load_from("/nonexistent/path/does-not-exist.toml").unwrap();
        assert_eq!(config.model.max_tool_rounds, 2);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.limits.per_user_per_hour = 42;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.limits.per_user_per_hour, 42);
    }

    #[test]
    fn is_admin_checks_configured_ids() {
        let mut config = AppConfig::default();
        config.auth.admin_user_ids = vec![100, 200];
        assert!(config.is_admin(100));
        assert!(!config.is_admin(300));
    }
}
