use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content: None, tool_calls, tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: Some(content.into()), tool_calls: vec![], tool_call_id: Some(tool_call_id.into()) }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_tool_call_type")]
    pub r#type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Response from a single generation call, before any tool-calling loop
/// resolution. `thinking` carries model "thought" text when the provider
/// exposes it (e.g. Gemini thinking mode parts), kept separate from
/// `content` so callers can choose whether to surface it.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub content: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
    pub grounding_sources: Vec<String>,
}

/// Structured fields an LLM may embed in a fenced `json` code block inside
/// its reply, used for admin-facing structured replies (e.g. `/prompt set`
/// confirmations) that need both a machine-readable action and a
/// human-facing message in one generation call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredOutput {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
}

/// Extracts the first valid JSON payload from an LLM response, trying a
/// fenced ```json block first and falling back to the first `{`..last `}`
/// span in the trimmed text.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
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
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        action: String,
    }

    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let text = "prefix {\"action\":\"bare\"} ```json\n{\"action\":\"fenced\"}\n``` suffix";
        let out: Sample = extract_json_output(text).unwrap();
        assert_eq!(out.action, "fenced");
    }

    #[test]
    fn extract_bare_json_when_no_fence_present() {
        let text = "Sure, here you go: {\"action\":\"bare\"}";
        let out: Sample = extract_json_output(text).unwrap();
        assert_eq!(out.action, "bare");
    }

    #[test]
    fn extract_two_bare_objects_returns_first_span_match() {
        let text = "{\"action\":\"first\"} and {\"action\":\"second\"}";
        // first '{' to last '}' spans both objects, which is not valid JSON,
        // so this should fail to parse as a single object.
        let out: Option<Sample> = extract_json_output(text);
        assert!(out.is_none());
    }

    #[test]
    fn extract_returns_none_for_non_json_text() {
        let out: Option<Sample> = extract_json_output("just a plain reply, nothing structured");
        assert!(out.is_none());
    }
}
