use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Caches messages sharing a `media_group_id` so they can be collected into
/// one logical message instead of processed one-by-one: the first arrival
/// waits briefly for siblings, later arrivals join the existing entry.
#[derive(Default)]
pub struct AlbumCache {
    groups: Mutex<HashMap<String, AlbumEntry>>,
}

struct AlbumEntry {
    media: Vec<String>,
    first_seen: Instant,
}

pub enum AlbumJoin {
    /// This message is the first of its group; caller should wait
    /// `sibling_wait` before collecting the group's media.
    First,
    /// This message joined an already-tracked group.
    Joined,
}

impl AlbumCache {
    /// Registers `media_ref` under `group_id`, returning whether this is the
    /// group's first-seen message (caller waits) or a later sibling.
    pub async fn register(&self, group_id: &str, media_ref: String) -> AlbumJoin {
        let mut groups = self.groups.lock().await;
        match groups.get_mut(group_id) {
            Some(entry) => {
                entry.media.push(media_ref);
                AlbumJoin::Joined
            }
            None => {
                groups.insert(
                    group_id.to_string(),
                    AlbumEntry {
                        media: vec![media_ref],
                        first_seen: Instant::now(),
                    },
                );
                AlbumJoin::First
            }
        }
    }

    pub async fn take(&self, group_id: &str) -> Vec<String> {
        self.groups
            .lock()
            .await
            .remove(group_id)
            .map(|e| e.media)
            .unwrap_or_default()
    }

    /// Best-effort sweep dropping groups older than `ttl`, matching the
    /// spec's "cache entries expire on a best-effort interval" rule.
    pub async fn sweep(&self, ttl: Duration) {
        let mut groups = self.groups.lock().await;
        groups.retain(|_, entry| entry.first_seen.elapsed() < ttl);
    }

    pub fn spawn_sweeper(
        cache: std::sync::Arc<Self>,
        tick: Duration,
        ttl: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => cache.sweep(ttl).await,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_registration_reports_first() {
        let cache = AlbumCache::default();
        assert!(matches!(
            cache.register("g1", "photo1".to_string()).await,
            AlbumJoin::First
        ));
        assert!(matches!(
            cache.register("g1", "photo2".to_string()).await,
            AlbumJoin::Joined
        ));

        let media = cache.take("g1").await;
        assert_eq!(media, vec!["photo1".to_string(), "photo2".to_string()]);
    }

    #[tokio::test]
    async fn sweep_drops_expired_groups() {
        let cache = AlbumCache::default();
        cache.register("g1", "photo1".to_string()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.sweep(Duration::from_millis(5)).await;

        let media = cache.take("g1").await;
        assert!(media.is_empty());
    }
}
