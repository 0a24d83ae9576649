//! LLM gateway: a bounded tool-calling generation loop, embeddings, API-key
//! rotation on quota errors, and a circuit breaker, behind a `Gateway` trait
//! so the rest of the system can be tested against a `MockGateway`.

mod circuit;
mod gateway;
mod http_gateway;
mod mock;
mod types;

pub use circuit::{Admission, CircuitBreaker};
pub use gateway::{Gateway, GatewayError, Result, ToolCallback};
pub use http_gateway::HttpGateway;
pub use mock::MockGateway;
pub use types::{
    extract_json_output, ChatMessage, ChatRole, GenerationResult, StructuredOutput, ToolCall,
    ToolCallFunction,
};
