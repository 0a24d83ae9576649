use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Pluggable embedding function so the memory crate never talks to the LLM
/// gateway directly. Returns `None` when an embedding couldn't be produced
/// (quota exhausted, unsupported text) rather than failing the caller's
/// write; dedup and ranking simply fall back to their no-embedding path.
pub type EmbedFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<Vec<f32>>> + Send>> + Send + Sync>;
