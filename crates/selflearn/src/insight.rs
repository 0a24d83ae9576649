//! Optional LLM-driven reflection: given an effectiveness summary and the
//! bot's own top facts, ask an injected closure for a structured insight.
//! Kept closure-based so this crate never depends on the LLM gateway
//! directly, mirroring the embed/summarize injection points elsewhere.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::effectiveness::EffectivenessSummary;

pub type InsightFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub confidence: f64,
    pub actionable: bool,
}

pub fn build_prompt(summary: &EffectivenessSummary, top_facts: &[String]) -> String {
    let facts_block = if top_facts.is_empty() {
        "(none)".to_string()
    } else {
        top_facts.join("\n")
    };
    format!(
        "Recent effectiveness: {:.2} over {} reactions (praised {}, corrected {}, negative {}).\n\
         Top self-facts:\n{}\n\n\
         Respond with a single JSON object: {{\"type\": string, \"text\": string, \"confidence\": number 0-1, \"actionable\": boolean}}.",
        summary.recent_effectiveness,
        summary.sample_size,
        summary.praised_count,
        summary.corrected_count,
        summary.negative_count,
        facts_block,
    )
}

/// Extracts the first valid JSON object from a free-form LLM response,
/// preferring a fenced ```json block.
fn extract_json_object<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

pub async fn generate_insight(
    insight_fn: &InsightFn,
    summary: &EffectivenessSummary,
    top_facts: &[String],
) -> Option<Insight> {
    let prompt = build_prompt(summary, top_facts);
    let response = insight_fn(prompt).await?;
    extract_json_object(&response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "here:\n```json\n{\"type\":\"tool_effectiveness\",\"text\":\"x\",\"confidence\":0.8,\"actionable\":true}\n```";
        let insight: Insight = extract_json_object(text).unwrap();
        assert_eq!(insight.kind, "tool_effectiveness");
        assert!(insight.actionable);
    }

    #[test]
    fn extracts_bare_json() {
        let text = "Sure: {\"type\":\"mistake_pattern\",\"text\":\"x\",\"confidence\":0.5,\"actionable\":false}";
        let insight: Insight = extract_json_object(text).unwrap();
        assert_eq!(insight.kind, "mistake_pattern");
        assert!(!insight.actionable);
    }

    #[test]
    fn non_json_response_yields_none() {
        let insight: Option<Insight> = extract_json_object("just some prose");
        assert!(insight.is_none());
    }

    #[tokio::test]
    async fn generate_insight_returns_none_when_closure_returns_none() {
        let insight_fn: InsightFn = Arc::new(|_| Box::pin(async { None }));
        let summary = EffectivenessSummary::default();
        let result = generate_insight(&insight_fn, &summary, &[]).await;
        assert!(result.is_none());
    }
}
