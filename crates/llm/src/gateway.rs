use async_trait::async_trait;

use crate::types::{ChatMessage, GenerationResult};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("quota exceeded on all configured keys")]
    Quota,
    #[error("circuit breaker open, request rejected without calling provider")]
    CircuitOpen,
    #[error("request timed out")]
    Timeout,
    #[error("provider does not support this feature: {0}")]
    UnsupportedFeature(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response could not be parsed: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// A callback invoked for each tool call the model requests; returns the
/// tool's string result to feed back as a `ChatMessage::tool_result`.
pub type ToolCallback<'a> =
    dyn Fn(&str, &serde_json::Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send + 'a>>
        + Send
        + Sync
        + 'a;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Runs the bounded tool-calling loop: calls the model, and while it
    /// requests tool calls (up to `max_rounds`), resolves them via
    /// `tool_callback` and feeds results back, returning the final
    /// natural-language turn.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[serde_json::Value],
        tool_callback: &ToolCallback<'_>,
        max_rounds: u32,
    ) -> Result<GenerationResult>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
