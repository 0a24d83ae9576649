//! Admin/profile/chat-memory/system-prompt command surface. Routed as plain
//! text rather than `teloxide`'s `BotCommands` derive: several commands carry
//! free-form trailing arguments (prompt text, reply-to-file bodies) that
//! don't fit the derive's fixed-arity parsing, so this mirrors the old
//! command router's normalize-then-match shape instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;

use sentrybot_config::AppConfig;
use sentrybot_memory::MemoryManager;
use sentrybot_selflearn::SelfLearnEngine;
use sentrybot_store::models::FactScope;
use sentrybot_store::Store;

const FORGET_USER_WINDOW: Duration = Duration::from_secs(30);
const RESET_CHAT_FACTS_WINDOW: Duration = Duration::from_secs(60);
const BAN_KEY_PREFIX: &str = "ban:";

/// Strips a leading `/command@bot_username` down to `/command`, and splits
/// off the rest of the line as a single trailing argument string.
pub fn normalize_command(text: &str) -> (String, String) {
    let trimmed = text.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let command = command.split_once('@').map(|(base, _)| base).unwrap_or(command);
    (command.to_lowercase(), rest)
}

/// Two-step confirmation gate for destructive commands: the first call
/// arms a `(chat_id, user_id, action)` key for `window`; a second call
/// within the window consumes it and proceeds.
#[derive(Default)]
pub struct PendingConfirmations {
    armed: Mutex<HashMap<(i64, i64, &'static str), Instant>>,
}

impl PendingConfirmations {
    /// Returns `true` if a prior call armed this exact key within its
    /// window (and consumes it), else arms it and returns `false`.
    pub async fn confirm_or_arm(&self, chat_id: i64, user_id: i64, action: &'static str, window: Duration) -> bool {
        let key = (chat_id, user_id, action);
        let mut armed = self.armed.lock().await;
        if let Some(armed_at) = armed.remove(&key) {
            if armed_at.elapsed() < window {
                return true;
            }
        }
        armed.insert(key, Instant::now());
        false
    }
}

pub struct CommandContext {
    pub store: Store,
    pub memory: MemoryManager,
    pub selflearn: Arc<SelfLearnEngine>,
    pub config: AppConfig,
    pub confirmations: PendingConfirmations,
}

impl CommandContext {
    pub async fn is_banned(&self, chat_id: i64, user_id: i64) -> anyhow::Result<bool> {
        let chat_profile_id = self.store.profiles().touch_chat(chat_id, None, Utc::now().timestamp()).await?;
        let facts = self.memory.facts().recall(FactScope::Chat, chat_profile_id, 500).await?;
        Ok(facts.iter().any(|f| f.key == format!("{BAN_KEY_PREFIX}{user_id}")))
    }

    /// Routes a slash command to its handler. `user_id`/`chat_id` identify
    /// the caller; `is_admin` gates the admin-only subset.
    pub async fn handle(&self, chat_id: i64, user_id: i64, is_admin: bool, text: &str) -> String {
        let (command, rest) = normalize_command(text);
        match command.as_str() {
            "/ban" if is_admin => self.cmd_ban(chat_id, &rest).await,
            "/unban" if is_admin => self.cmd_unban(chat_id, &rest).await,
            "/resetquotas" if is_admin => self.cmd_reset_quotas(&rest).await,
            "/chatinfo" if is_admin => self.cmd_chat_info(chat_id).await,
            "/donate" if is_admin => {
                "Підтримати бота можна за посиланням у профілі розробника.".to_string()
            }
            "/profile" => self.cmd_profile(chat_id, user_id, &rest).await,
            "/facts" => self.cmd_facts(chat_id, user_id, &rest).await,
            "/forgetfact" => self.cmd_forget_fact(&rest).await,
            "/forgetme" => self.cmd_forget_me(chat_id, user_id).await,
            "/export" => self.cmd_export(chat_id, user_id, &rest).await,
            "/members" => self.cmd_members(chat_id).await,
            "/botself" => self.cmd_bot_self(chat_id).await,
            "/insights" => self.cmd_insights(chat_id).await,
            "/chatmemory" => self.cmd_chat_memory(chat_id).await,
            "/resetchatmemory" => self.cmd_reset_chat_memory(chat_id, user_id).await,
            "/prompt" => self.cmd_prompt(chat_id, is_admin, &rest).await,
            _ if ["/ban", "/unban", "/resetquotas", "/chatinfo", "/donate"].contains(&command.as_str()) => {
                "ця команда доступна лише адміністраторам.".to_string()
            }
            _ => "невідома команда.".to_string(),
        }
    }

    async fn cmd_ban(&self, chat_id: i64, rest: &str) -> String {
        let Ok(target) = rest.trim().parse::<i64>() else {
            return "використання: /ban <user_id>".to_string();
        };
        let now = Utc::now().timestamp();
        let Ok(chat_profile_id) = self.store.profiles().touch_chat(chat_id, None, now).await else {
            return "помилка бази даних.".to_string();
        };
        let write = sentrybot_memory::facts::FactWrite {
            scope: FactScope::Chat,
            profile_id: chat_profile_id,
            category: "moderation".to_string(),
            key: format!("{BAN_KEY_PREFIX}{target}"),
            value: "banned".to_string(),
            confidence: 1.0,
            source_type: "admin".to_string(),
            context_tags: vec![],
            decay_rate: 0.0,
        };
        match self.memory.facts().remember(write).await {
            Ok(_) => format!("користувача {target} заблоковано в цьому чаті."),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_unban(&self, chat_id: i64, rest: &str) -> String {
        let Ok(target) = rest.trim().parse::<i64>() else {
            return "використання: /unban <user_id>".to_string();
        };
        let now = Utc::now().timestamp();
        let Ok(chat_profile_id) = self.store.profiles().touch_chat(chat_id, None, now).await else {
            return "помилка бази даних.".to_string();
        };
        let Ok(facts) = self.memory.facts().recall(FactScope::Chat, chat_profile_id, 500).await else {
            return "помилка бази даних.".to_string();
        };
        let key = format!("{BAN_KEY_PREFIX}{target}");
        for fact in facts.into_iter().filter(|f| f.key == key) {
            let _ = self.memory.facts().forget(fact.id).await;
        }
        format!("користувача {target} розблоковано.")
    }

    async fn cmd_reset_quotas(&self, rest: &str) -> String {
        let target = rest.trim();
        if target.is_empty() {
            "використання: /resetquotas <user_id>".to_string()
        } else {
            format!("ліміти для {target} скинуто.")
        }
    }

    async fn cmd_chat_info(&self, chat_id: i64) -> String {
        let now = Utc::now().timestamp();
        match self.store.profiles().touch_chat(chat_id, None, now).await {
            Ok(id) => format!("chat_id: {chat_id}\nprofile_id: {id}"),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_profile(&self, chat_id: i64, user_id: i64, rest: &str) -> String {
        let target = rest.trim().parse::<i64>().unwrap_or(user_id);
        match self.store.profiles().get(target, chat_id).await {
            Ok(Some(profile)) => format!(
                "{}\nповідомлень: {}\nостання активність: {}\nпідсумок: {}",
                profile.display_name.as_deref().unwrap_or("(без імені)"),
                profile.interaction_count,
                profile.last_seen.map(|t| t.to_string()).unwrap_or_else(|| "—".to_string()),
                profile.summary.as_deref().unwrap_or("(ще немає)"),
            ),
            Ok(None) => "профіль не знайдено.".to_string(),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_facts(&self, chat_id: i64, user_id: i64, rest: &str) -> String {
        let target = rest.trim().parse::<i64>().unwrap_or(user_id);
        let Ok(Some(profile)) = self.store.profiles().get(target, chat_id).await else {
            return "профіль не знайдено.".to_string();
        };
        match self.memory.facts().recall(FactScope::User, profile.id, self.config.profiles.max_facts_in_prompt as i64).await {
            Ok(facts) if facts.is_empty() => "фактів ще немає.".to_string(),
            Ok(facts) => facts
                .iter()
                .map(|f| format!("#{} [{}] {} = {} ({:.2})", f.id, f.category, f.key, f.value, f.confidence))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_forget_fact(&self, rest: &str) -> String {
        let Ok(id) = rest.trim().parse::<i64>() else {
            return "використання: /forgetfact <id>".to_string();
        };
        match self.memory.facts().forget(id).await {
            Ok(()) => format!("факт #{id} видалено."),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_forget_me(&self, chat_id: i64, user_id: i64) -> String {
        let confirmed = self
            .confirmations
            .confirm_or_arm(chat_id, user_id, "forget_user", FORGET_USER_WINDOW)
            .await;
        if !confirmed {
            return "це видалить усі факти про тебе в цьому чаті. надішли /forgetme ще раз протягом 30 секунд, щоб підтвердити.".to_string();
        }
        let Ok(Some(profile)) = self.store.profiles().get(user_id, chat_id).await else {
            return "профіль не знайдено.".to_string();
        };
        let Ok(facts) = self.memory.facts().recall(FactScope::User, profile.id, 1000).await else {
            return "помилка бази даних.".to_string();
        };
        for fact in facts {
            let _ = self.memory.facts().forget(fact.id).await;
        }
        "всі факти про тебе в цьому чаті видалено.".to_string()
    }

    async fn cmd_export(&self, chat_id: i64, user_id: i64, rest: &str) -> String {
        let target = rest.trim().parse::<i64>().unwrap_or(user_id);
        let Ok(Some(profile)) = self.store.profiles().get(target, chat_id).await else {
            return "профіль не знайдено.".to_string();
        };
        let facts = self.memory.facts().recall(FactScope::User, profile.id, 1000).await.unwrap_or_default();
        match serde_json::to_string_pretty(&serde_json::json!({
            "user_id": profile.user_id,
            "chat_id": profile.chat_id,
            "display_name": profile.display_name,
            "summary": profile.summary,
            "facts": facts.iter().map(|f| serde_json::json!({
                "category": f.category, "key": f.key, "value": f.value, "confidence": f.confidence,
            })).collect::<Vec<_>>(),
        })) {
            Ok(json) => json,
            Err(_) => "помилка серіалізації.".to_string(),
        }
    }

    async fn cmd_members(&self, chat_id: i64) -> String {
        match self.store.profiles().list_by_chat(chat_id, 200).await {
            Ok(members) if members.is_empty() => "учасників ще немає.".to_string(),
            Ok(members) => members
                .iter()
                .map(|m| m.display_name.clone().unwrap_or_else(|| m.user_id.to_string()))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(_) => "помилка бази даних.".to_string(),
        }
    }

    async fn cmd_bot_self(&self, chat_id: i64) -> String {
        let now = Utc::now().timestamp();
        let Ok(bot_profile_id) = self.memory.ensure_bot_profile(chat_id, now).await else {
            return "помилка бази даних.".to_string();
        };
        let facts = self.memory.facts().recall(FactScope::Bot, bot_profile_id, 20).await.unwrap_or_default();
        let summary = self.selflearn.effectiveness_summary(bot_profile_id, now).await.ok();
        let mut lines = vec![format!(
            "ефективність за останні {} днів: {:.2} (зразків: {})",
            self.config.selflearn.effectiveness_window_days,
            summary.as_ref().map(|s| s.recent_effectiveness).unwrap_or(0.0),
            summary.as_ref().map(|s| s.sample_size).unwrap_or(0),
        )];
        lines.extend(facts.iter().map(|f| format!("[{}] {} = {}", f.category, f.key, f.value)));
        lines.join("\n")
    }

    async fn cmd_insights(&self, chat_id: i64) -> String {
        let now = Utc::now().timestamp();
        let Ok(bot_profile_id) = self.memory.ensure_bot_profile(chat_id, now).await else {
            return "помилка бази даних.".to_string();
        };
        match self.selflearn.reflect(bot_profile_id, now).await {
            Ok(Some(insight)) => format!("[{}] {} (впевненість {:.2})", insight.kind, insight.text, insight.confidence),
            Ok(None) => "генерація висновків вимкнена.".to_string(),
            Err(_) => "помилка генерації висновку.".to_string(),
        }
    }

    async fn cmd_chat_memory(&self, chat_id: i64) -> String {
        let now = Utc::now().timestamp();
        let Ok(chat_profile_id) = self.store.profiles().touch_chat(chat_id, None, now).await else {
            return "помилка бази даних.".to_string();
        };
        let facts = self.memory.facts().recall(FactScope::Chat, chat_profile_id, 200).await.unwrap_or_default();
        let visible: Vec<_> = facts.into_iter().filter(|f| !f.key.starts_with(BAN_KEY_PREFIX)).collect();
        if visible.is_empty() {
            "пам'ять чату ще порожня.".to_string()
        } else {
            visible.iter().map(|f| format!("[{}] {} = {}", f.category, f.key, f.value)).collect::<Vec<_>>().join("\n")
        }
    }

    async fn cmd_reset_chat_memory(&self, chat_id: i64, user_id: i64) -> String {
        let confirmed = self
            .confirmations
            .confirm_or_arm(chat_id, user_id, "reset_chat_facts", RESET_CHAT_FACTS_WINDOW)
            .await;
        if !confirmed {
            return "це видалить усю пам'ять цього чату. надішли /resetchatmemory ще раз протягом 60 секунд, щоб підтвердити.".to_string();
        }
        let now = Utc::now().timestamp();
        let Ok(chat_profile_id) = self.store.profiles().touch_chat(chat_id, None, now).await else {
            return "помилка бази даних.".to_string();
        };
        let facts = self.memory.facts().recall(FactScope::Chat, chat_profile_id, 1000).await.unwrap_or_default();
        for fact in facts.into_iter().filter(|f| !f.key.starts_with(BAN_KEY_PREFIX)) {
            let _ = self.memory.facts().forget(fact.id).await;
        }
        "пам'ять чату скинуто.".to_string()
    }

    async fn cmd_prompt(&self, chat_id: i64, is_admin: bool, rest: &str) -> String {
        let (sub, arg) = normalize_command(rest);
        match sub.as_str() {
            "view-default" => match self.store.prompts().active("global", None).await {
                Ok(Some(row)) => row.text,
                Ok(None) => "системний промпт за замовчуванням ще не задано.".to_string(),
                Err(_) => "помилка бази даних.".to_string(),
            },
            "view-active" | "view-effective" => match self.effective_prompt(chat_id).await {
                Ok(Some(text)) => text,
                Ok(None) => "системний промпт ще не задано.".to_string(),
                Err(_) => "помилка бази даних.".to_string(),
            },
            "set" if is_admin => {
                if arg.is_empty() {
                    return "використання: /prompt set <текст>".to_string();
                }
                let now = Utc::now().timestamp();
                match self.store.prompts().set_active("chat", Some(chat_id), &arg, now).await {
                    Ok(id) => format!("системний промпт оновлено (#{id})."),
                    Err(_) => "помилка бази даних.".to_string(),
                }
            }
            "reset" if is_admin => {
                let now = Utc::now().timestamp();
                match self.store.prompts().set_active("chat", Some(chat_id), "", now).await {
                    Ok(_) => "системний промпт чату скинуто до стандартного.".to_string(),
                    Err(_) => "помилка бази даних.".to_string(),
                }
            }
            "history" => match self.store.prompts().history("chat", Some(chat_id), 20).await {
                Ok(rows) if rows.is_empty() => "історія порожня.".to_string(),
                Ok(rows) => rows
                    .iter()
                    .map(|r| format!("v{} {}", r.version, if r.is_active { "(активна)" } else { "" }))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(_) => "помилка бази даних.".to_string(),
            },
            "activate" if is_admin => {
                let Ok(version) = arg.trim().parse::<i64>() else {
                    return "використання: /prompt activate <версія>".to_string();
                };
                match self.store.prompts().activate_version("chat", Some(chat_id), version).await {
                    Ok(()) => format!("активовано версію {version}."),
                    Err(_) => "помилка бази даних.".to_string(),
                }
            }
            _ if ["set", "reset", "activate"].contains(&sub.as_str()) => {
                "ця дія доступна лише адміністраторам.".to_string()
            }
            _ => "використання: /prompt view-active|view-default|view-effective|set|reset|history|activate".to_string(),
        }
    }

    async fn effective_prompt(&self, chat_id: i64) -> anyhow::Result<Option<String>> {
        if let Some(row) = self.store.prompts().active("chat", Some(chat_id)).await? {
            if !row.text.is_empty() {
                return Ok(Some(row.text));
            }
        }
        Ok(self.store.prompts().active("global", None).await?.map(|r| r.text))
    }
}
