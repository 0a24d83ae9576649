use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::LayeredContext;

#[derive(Clone)]
struct CacheEntry {
    context: LayeredContext,
    cached_at: Instant,
    ttl: Duration,
}

/// In-process L1 cache of recently-assembled contexts, keyed by
/// `(chat_id, thread_id)`. Adaptive TTL lets busier chats get a shorter
/// lifetime (fresher context) while quiet chats get the long end.
pub struct ContextCache {
    inner: Mutex<LruCache<(i64, Option<i64>), CacheEntry>>,
    ttl_min: Duration,
    ttl_max: Duration,
}

impl ContextCache {
    pub fn new(capacity: usize, ttl_min: Duration, ttl_max: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1"),
            )),
            ttl_min,
            ttl_max,
        }
    }

    pub async fn get(&self, key: (i64, Option<i64>)) -> Option<LayeredContext> {
        let mut cache = self.inner.lock().await;
        let entry = cache.get(&key)?;
        if entry.cached_at.elapsed() < entry.ttl {
            Some(entry.context.clone())
        } else {
            cache.pop(&key);
            None
        }
    }

    /// `recent_activity_messages_per_minute` drives where in `[ttl_min,
    /// ttl_max]` this entry lands: busier chats get shorter TTLs.
    pub async fn put(
        &self,
        key: (i64, Option<i64>),
        context: LayeredContext,
        recent_activity_messages_per_minute: f64,
    ) {
        let busy_fraction = (recent_activity_messages_per_minute / 10.0).clamp(0.0, 1.0);
        let span = self.ttl_max.as_secs_f64() - self.ttl_min.as_secs_f64();
        let ttl = Duration::from_secs_f64(self.ttl_max.as_secs_f64() - busy_fraction * span);

        let mut cache = self.inner.lock().await;
        cache.put(
            key,
            CacheEntry {
                context,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LayerOutput;

    fn sample_context() -> LayeredContext {
        LayeredContext {
            immediate: LayerOutput::default(),
            recent: LayerOutput::default(),
            relevant: LayerOutput::default(),
            background: None,
            episodic: None,
            total_tokens: 0,
            assembly_latency_ms: 0,
        }
    }

    #[tokio::test]
    async fn put_then_get_hits_before_ttl() {
        let cache = ContextCache::new(10, Duration::from_secs(60), Duration::from_secs(90));
        cache.put((1, None), sample_context(), 0.0).await;
        assert!(cache.get((1, None)).await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_misses() {
        let cache = ContextCache::new(10, Duration::from_millis(1), Duration::from_millis(1));
        cache.put((1, None), sample_context(), 0.0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get((1, None)).await.is_none());
    }
}
