//! Hybrid retrieval: combines semantic (vector cosine) and keyword (FTS5)
//! search over message history into one ranked list, with temporal decay
//! and a type boost. `vector::cosine_similarity` is also reused by the fact
//! store's dedup check and the episode boundary detector's semantic signal.

pub mod hybrid;
pub mod vector;

pub use hybrid::{HybridSearch, HybridSearchConfig, RankedMessage};
pub use vector::cosine_similarity;
