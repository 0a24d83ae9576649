use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::circuit::{Admission, CircuitBreaker};
use crate::gateway::{Gateway, GatewayError, Result, ToolCallback};
use crate::types::{ChatMessage, ChatRole, GenerationResult, ToolCall, ToolCallFunction};

const GENERATE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// HTTP-backed gateway generalizing the teacher's Ollama/OpenRouter router
/// into a single Gemini-style provider with API-key rotation on quota
/// errors and a circuit breaker shared across keys.
pub struct HttpGateway {
    client: reqwest::Client,
    api_keys: Vec<String>,
    next_key: AtomicUsize,
    generation_model: String,
    embedding_model: String,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl HttpGateway {
    pub fn new(
        api_keys: Vec<String>,
        generation_model: String,
        embedding_model: String,
        timeout: Duration,
        breaker_failure_threshold: u32,
        breaker_cooldown: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_keys,
            next_key: AtomicUsize::new(0),
            generation_model,
            embedding_model,
            timeout,
            breaker: CircuitBreaker::new(breaker_failure_threshold, breaker_cooldown),
        }
    }

    fn rotate_key(&self) -> Option<&str> {
        if self.api_keys.is_empty() {
            return None;
        }
        let idx = self.next_key.fetch_add(1, Ordering::Relaxed) % self.api_keys.len();
        Some(self.api_keys[idx].as_str())
    }

    async fn generate_once(
        &self,
        contents: &[GeminiContent],
        tools: &[serde_json::Value],
    ) -> Result<GeminiCandidateParsed> {
        let mut last_err = None;
        for _ in 0..self.api_keys.len().max(1) {
            let key = self
                .rotate_key()
                .ok_or(GatewayError::UnsupportedFeature("no api keys configured"))?;

            let url = format!("{GENERATE_ENDPOINT}/{}:generateContent", self.generation_model);
            let body = json!({
                "contents": contents,
                "tools": if tools.is_empty() { serde_json::Value::Null } else { json!([{ "functionDeclarations": tools }]) },
            });

            let response = self
                .client
                .post(&url)
                .query(&[("key", key)])
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(err) => {
                    last_err = Some(GatewayError::Transport(err));
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_err = Some(GatewayError::Quota);
                continue;
            }

            let parsed: GeminiResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Parse(e.to_string()))?;

            return parse_candidate(parsed);
        }
        Err(last_err.unwrap_or(GatewayError::Quota))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[serde_json::Value],
        tool_callback: &ToolCallback<'_>,
        max_rounds: u32,
    ) -> Result<GenerationResult> {
        if self.breaker.admit().await == Admission::Rejected {
            return Err(GatewayError::CircuitOpen);
        }

        let mut contents: Vec<GeminiContent> = messages.iter().map(to_gemini_content).collect();
        let mut last_result: Option<GenerationResult> = None;

        for round in 0..max_rounds.max(1) {
            let parsed = match self.generate_once(&contents, tools).await {
                Ok(p) => p,
                Err(err) => {
                    self.breaker.record_failure().await;
                    return Err(err);
                }
            };

            if parsed.tool_calls.is_empty() {
                self.breaker.record_success().await;
                return Ok(GenerationResult {
                    content: parsed.text,
                    thinking: parsed.thinking,
                    tool_calls: parsed.tool_calls,
                    finish_reason: parsed.finish_reason,
                    grounding_sources: parsed.grounding_sources,
                });
            }

            if round + 1 == max_rounds {
                if parsed.text.is_empty() {
                    let retry = match self.generate_once(&contents, &[]).await {
                        Ok(p) => p,
                        Err(err) => {
                            self.breaker.record_failure().await;
                            return Err(err);
                        }
                    };
                    self.breaker.record_success().await;
                    return Ok(GenerationResult {
                        content: retry.text,
                        thinking: retry.thinking,
                        tool_calls: Vec::new(),
                        finish_reason: retry.finish_reason,
                        grounding_sources: retry.grounding_sources,
                    });
                }
                self.breaker.record_success().await;
                return Ok(GenerationResult {
                    content: parsed.text,
                    thinking: parsed.thinking,
                    tool_calls: parsed.tool_calls,
                    finish_reason: parsed.finish_reason,
                    grounding_sources: parsed.grounding_sources,
                });
            }

            contents.push(GeminiContent {
                role: "model".to_string(),
                parts: parsed
                    .tool_calls
                    .iter()
                    .map(|call| GeminiPart::FunctionCall {
                        function_call: GeminiFunctionCall {
                            name: call.function.name.clone(),
                            args: call.function.arguments.clone(),
                        },
                    })
                    .collect(),
            });

            let mut response_parts = Vec::new();
            for call in &parsed.tool_calls {
                let result = tool_callback(&call.function.name, &call.function.arguments).await;
                response_parts.push(GeminiPart::FunctionResponse {
                    function_response: GeminiFunctionResponse {
                        name: call.function.name.clone(),
                        response: json!({ "result": result }),
                    },
                });
            }
            contents.push(GeminiContent {
                role: "user".to_string(),
                parts: response_parts,
            });

            last_result = Some(GenerationResult {
                content: parsed.text,
                thinking: parsed.thinking,
                tool_calls: parsed.tool_calls,
                finish_reason: parsed.finish_reason,
                grounding_sources: parsed.grounding_sources,
            });
        }

        self.breaker.record_success().await;
        Ok(last_result.unwrap_or_default())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self
            .rotate_key()
            .ok_or(GatewayError::UnsupportedFeature("no api keys configured"))?;
        let url = format!("{GENERATE_ENDPOINT}/{}:embedContent", self.embedding_model);
        let body = json!({
            "content": { "parts": [{ "text": text }] }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(parsed.embedding.values)
    }
}

fn to_gemini_content(msg: &ChatMessage) -> GeminiContent {
    let role = match msg.role {
        ChatRole::User | ChatRole::System => "user",
        ChatRole::Assistant => "model",
        ChatRole::Tool => "user",
    };
    GeminiContent {
        role: role.to_string(),
        parts: vec![GeminiPart::Text {
            text: msg.content.clone().unwrap_or_default(),
        }],
    }
}

struct GeminiCandidateParsed {
    text: String,
    thinking: Option<String>,
    tool_calls: Vec<ToolCall>,
    finish_reason: String,
    grounding_sources: Vec<String>,
}

fn parse_candidate(response: GeminiResponse) -> Result<GeminiCandidateParsed> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::Parse("no candidates in response".to_string()))?;

    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.parts {
        match part {
            GeminiPart::Text { text: part_text } => text.push_str(&part_text),
            GeminiPart::Thought { thought } => thinking.push_str(&thought),
            GeminiPart::FunctionCall { function_call } => {
                tool_calls.push(ToolCall {
                    id: format!("call_{}", tool_calls.len()),
                    r#type: "function".to_string(),
                    function: ToolCallFunction {
                        name: function_call.name,
                        arguments: function_call.args,
                    },
                });
            }
            GeminiPart::FunctionResponse { .. } => {}
        }
    }

    let grounding_sources = candidate
        .grounding_metadata
        .map(|g| g.sources)
        .unwrap_or_default();

    Ok(GeminiCandidateParsed {
        text,
        thinking: if thinking.is_empty() { None } else { Some(thinking) },
        tool_calls,
        finish_reason: candidate.finish_reason.unwrap_or_else(|| "stop".to_string()),
        grounding_sources,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
enum GeminiPart {
    Text { text: String },
    Thought { thought: String },
    FunctionCall { function_call: GeminiFunctionCall },
    FunctionResponse { function_response: GeminiFunctionResponse },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContentIn,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentIn {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
