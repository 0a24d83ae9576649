use async_trait::async_trait;

use crate::gateway::{Gateway, Result, ToolCallback};
use crate::types::{ChatMessage, GenerationResult};

/// Deterministic gateway for tests: echoes the last user message back with
/// a fixed prefix and returns a fixed-dimension zero embedding.
pub struct MockGateway {
    pub reply_prefix: String,
    pub embedding_dim: usize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            reply_prefix: "mock: ".to_string(),
            embedding_dim: 8,
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        _tools: &[serde_json::Value],
        _tool_callback: &ToolCallback<'_>,
        _max_rounds: u32,
    ) -> Result<GenerationResult> {
        let last_user = messages
            .iter()
            .rev()
            .find_map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(GenerationResult {
            content: format!("{}{}", self.reply_prefix, last_user),
            thinking: None,
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            grounding_sources: Vec::new(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.embedding_dim];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.embedding_dim] += b as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
