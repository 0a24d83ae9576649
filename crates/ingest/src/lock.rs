use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Per-`(chat_id, user_id)` processing lock: prevents a slow generation from
/// causing a backlog of queued replies for the same user. Held messages are
/// dropped silently with a counter increment rather than queued, matching the
/// chat-filter's silent-drop semantics.
#[derive(Default)]
pub struct ProcessingLocks {
    held: Mutex<HashMap<(i64, i64), Instant>>,
    ttl: Duration,
}

/// Releases its `(chat_id, user_id)` key when dropped, so a panic mid-turn
/// can't leave the lock held forever.
pub struct LockGuard {
    locks: Arc<ProcessingLocks>,
    key: (i64, i64),
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let locks = self.locks.clone();
        let key = self.key;
        tokio::spawn(async move {
            locks.held.lock().await.remove(&key);
        });
    }
}

impl ProcessingLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Attempts to acquire the lock for `(chat_id, user_id)`. Returns `None`
    /// if another turn is already in flight and hasn't exceeded the safety
    /// TTL (a stale lock past TTL is reclaimed rather than honored forever).
    pub async fn try_acquire(self: &Arc<Self>, chat_id: i64, user_id: i64) -> Option<LockGuard> {
        let key = (chat_id, user_id);
        let mut held = self.held.lock().await;
        if let Some(acquired_at) = held.get(&key) {
            if acquired_at.elapsed() < self.ttl {
                return None;
            }
        }
        held.insert(key, Instant::now());
        Some(LockGuard {
            locks: self.clone(),
            key,
        })
    }
}
