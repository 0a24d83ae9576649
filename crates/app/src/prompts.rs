//! Builds the prompts fed to the LLM gateway for the background
//! summarization/insight jobs. Kept separate from the crates that consume
//! them (memory, episodes, selflearn) so those stay gateway-agnostic.

use sentrybot_episodes::GeneratedSummary;

pub fn profile_summary_prompt(history: &[String]) -> String {
    format!(
        "Підсумуй одним-двома реченнями, що відомо про цього учасника чату \
         на основі його останніх повідомлень. Пиши українською, стисло, без вступних фраз.\n\n{}",
        history.join("\n")
    )
}

pub fn episode_summary_prompt(messages: &[String]) -> String {
    format!(
        "Ось фрагмент розмови. Визнач коротку тему (3-5 слів), одне-два речення підсумку, \
         емоційний тон (positive/neutral/negative/mixed) і до 5 тегів-ключових слів. \
         Відповідай у форматі JSON з полями topic, summary, valence, tags.\n\n{}",
        messages.join("\n")
    )
}

pub fn parse_episode_summary(raw: &str) -> Option<GeneratedSummary> {
    let value: serde_json::Value = sentrybot_llm::extract_json_output(raw)?;
    Some(GeneratedSummary {
        topic: value.get("topic")?.as_str()?.to_string(),
        summary: value.get("summary")?.as_str()?.to_string(),
        valence: value.get("valence").and_then(|v| v.as_str()).unwrap_or("neutral").to_string(),
        tags: value
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    })
}
