use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sentrybot_memory::{FactOutcome, FactWrite, MemoryManager};
use sentrybot_store::models::FactScope;

use crate::{Tool, ToolOutput, ToolParam, ToolSpec};

/// Tool-argument keys the orchestrator injects for every call so tools can
/// resolve which profile they're acting on without depending on the chat
/// layer: the invocation contract stays a flat string map either way.
const ARG_CHAT_ID: &str = "_chat_id";
const ARG_PROFILE_ID: &str = "_profile_id";

fn parse_i64(args: &HashMap<String, String>, key: &str) -> Result<i64> {
    args.get(key)
        .ok_or_else(|| anyhow::anyhow!("missing required context argument: {key}"))?
        .parse()
        .map_err(|_| anyhow::anyhow!("argument {key} is not a valid integer"))
}

pub struct RememberMemoryTool {
    memory: MemoryManager,
}

impl RememberMemoryTool {
    pub fn new(memory: MemoryManager) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberMemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "remember_memory".to_string(),
            description: "Records a fact about the current user for later recall.".to_string(),
            params: vec![
                ToolParam { name: "category".to_string(), description: "fact category, e.g. preference".to_string(), required: true },
                ToolParam { name: "key".to_string(), description: "short fact key".to_string(), required: true },
                ToolParam { name: "value".to_string(), description: "the fact's value".to_string(), required: true },
                ToolParam { name: "confidence".to_string(), description: "confidence 0..1".to_string(), required: false },
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let profile_id = parse_i64(args, ARG_PROFILE_ID)?;
        let category = args.get("category").cloned().unwrap_or_else(|| "general".to_string());
        let key = args.get("key").cloned().unwrap_or_else(|| "fact".to_string());
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: value"))?;
        let confidence: f64 = args
            .get("confidence")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.7);

        let outcome = self
            .memory
            .facts()
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category,
                key,
                value,
                confidence,
                source_type: "explicit".to_string(),
                context_tags: Vec::new(),
                decay_rate: 0.0,
            })
            .await?;

        let summary = match outcome {
            FactOutcome::Inserted(id) => format!("remembered new fact (id {id})"),
            FactOutcome::Reinforced(id) => format!("reinforced existing fact (id {id})"),
        };
        Ok(ToolOutput { success: true, output: summary })
    }
}

pub struct RecallMemoriesTool {
    memory: MemoryManager,
}

impl RecallMemoriesTool {
    pub fn new(memory: MemoryManager) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallMemoriesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "recall_memories".to_string(),
            description: "Lists known facts about the current user.".to_string(),
            params: vec![ToolParam {
                name: "limit".to_string(),
                description: "max facts to return".to_string(),
                required: false,
            }],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let profile_id = parse_i64(args, ARG_PROFILE_ID)?;
        let limit: i64 = args.get("limit").and_then(|s| s.parse().ok()).unwrap_or(20);

        let facts = self.memory.facts().recall(FactScope::User, profile_id, limit).await?;
        if facts.is_empty() {
            return Ok(ToolOutput { success: true, output: "no known facts".to_string() });
        }

        let lines: Vec<String> = facts
            .iter()
            .map(|f| format!("[{}] {} = {} (confidence {:.2})", f.category, f.key, f.value, f.confidence))
            .collect();
        Ok(ToolOutput { success: true, output: lines.join("\n") })
    }
}

pub struct ForgetMemoryTool {
    memory: MemoryManager,
}

impl ForgetMemoryTool {
    pub fn new(memory: MemoryManager) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ForgetMemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "forget_memory".to_string(),
            description: "Deactivates a previously remembered fact by id.".to_string(),
            params: vec![ToolParam {
                name: "fact_id".to_string(),
                description: "id of the fact to forget".to_string(),
                required: true,
            }],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let fact_id: i64 = args
            .get("fact_id")
            .ok_or_else(|| anyhow::anyhow!("missing required argument: fact_id"))?
            .parse()
            .map_err(|_| anyhow::anyhow!("fact_id is not a valid integer"))?;

        self.memory.facts().forget(fact_id).await?;
        Ok(ToolOutput { success: true, output: format!("forgot fact {fact_id}") })
    }
}

pub struct SetPronounsTool {
    memory: MemoryManager,
}

impl SetPronounsTool {
    pub fn new(memory: MemoryManager) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SetPronounsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_pronouns".to_string(),
            description: "Records the current user's preferred pronouns.".to_string(),
            params: vec![ToolParam {
                name: "pronouns".to_string(),
                description: "e.g. she/her, he/him, they/them".to_string(),
                required: true,
            }],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let profile_id = parse_i64(args, ARG_PROFILE_ID)?;
        let pronouns = args
            .get("pronouns")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: pronouns"))?;

        self.memory
            .facts()
            .remember(FactWrite {
                scope: FactScope::User,
                profile_id,
                category: "identity".to_string(),
                key: "pronouns".to_string(),
                value: pronouns.clone(),
                confidence: 0.95,
                source_type: "explicit".to_string(),
                context_tags: Vec::new(),
                decay_rate: 0.0,
            })
            .await?;

        Ok(ToolOutput { success: true, output: format!("pronouns set to {pronouns}") })
    }
}

#[allow(dead_code)]
fn _chat_id_key() -> &'static str {
    ARG_CHAT_ID
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrybot_store::Store;

    async fn memory() -> (MemoryManager, i64) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let profile_id = store.profiles().touch_user(1, 1, None, None, Utc::now().timestamp()).await.unwrap();
        (MemoryManager::new(store, 0.85, None), profile_id)
    }

    #[tokio::test]
    async fn remember_then_recall_round_trips() {
        let (memory, profile_id) = memory().await;
        let remember = RememberMemoryTool::new(memory.clone());
        let recall = RecallMemoriesTool::new(memory);

        let mut args = HashMap::new();
        args.insert(ARG_PROFILE_ID.to_string(), profile_id.to_string());
        args.insert("category".to_string(), "preference".to_string());
        args.insert("key".to_string(), "drink".to_string());
        args.insert("value".to_string(), "coffee".to_string());

        let out = remember.run(&args).await.unwrap();
        assert!(out.success);

        let recall_args = {
            let mut m = HashMap::new();
            m.insert(ARG_PROFILE_ID.to_string(), profile_id.to_string());
            m
        };
        let recalled = recall.run(&recall_args).await.unwrap();
        assert!(recalled.output.contains("coffee"));
    }

    #[tokio::test]
    async fn missing_profile_id_errors() {
        let (memory, _profile_id) = memory().await;
        let remember = RememberMemoryTool::new(memory);
        let mut args = HashMap::new();
        args.insert("value".to_string(), "coffee".to_string());
        assert!(remember.run(&args).await.is_err());
    }
}
