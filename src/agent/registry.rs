//! Per-session agent state
//!
//! One entry per (user, session) key. Entries idle longer than the configured
//! window are evicted on access; at capacity the least recently used entry
//! makes room for a new one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct Entry<T> {
    value: Arc<T>,
    last_used: Instant,
}

pub struct SessionRegistry<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
    idle: Duration,
    capacity: usize,
}

impl<T> SessionRegistry<T> {
    pub fn new(idle: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle,
            capacity: capacity.max(1),
        }
    }

    /// Existing entry for `key`, or the result of `init` stored under it.
    ///
    /// `init` runs without the registry lock held. If two callers race on the
    /// same key, the first insert wins and both get that entry.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = Arc::new(init().await?);

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(existing) = entries.get_mut(key) {
            existing.last_used = now;
            return Ok(existing.value.clone());
        }

        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "evicting least recently used session");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                last_used: now,
            },
        );
        Ok(value)
    }

    /// Live entry for `key`, refreshing its last-used time
    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        self.evict_idle(&mut entries, now);

        entries.get_mut(key).map(|entry| {
            entry.last_used = now;
            entry.value.clone()
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict_idle(&self, entries: &mut HashMap<String, Entry<T>>, now: Instant) {
        let idle = self.idle;
        entries.retain(|key, entry| {
            let keep = now.duration_since(entry.last_used) <= idle;
            if !keep {
                debug!(session = %key, "evicting idle session");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    async fn insert(registry: &SessionRegistry<String>, key: &str) -> Arc<String> {
        registry
            .get_or_try_insert_with(key, || async { Ok::<_, Infallible>(key.to_uppercase()) })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_same_key_returns_same_entry() {
        let registry = SessionRegistry::new(Duration::from_secs(60), 8);
        let first = insert(&registry, "user-1/s-1").await;

        let second = registry
            .get_or_try_insert_with("user-1/s-1", || async {
                Ok::<_, Infallible>("should not run".to_string())
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new(Duration::from_secs(60), 8);
        let a = insert(&registry, "user-1/a").await;
        let b = insert(&registry, "user-2/a").await;
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_init_is_not_cached() {
        let registry: SessionRegistry<String> = SessionRegistry::new(Duration::from_secs(60), 8);
        let result = registry
            .get_or_try_insert_with("s-1", || async { Err::<String, _>("boom") })
            .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_evicted() {
        let registry = SessionRegistry::new(Duration::from_secs(30), 8);
        insert(&registry, "s-1").await;

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.get("s-1").await.is_some());

        // Access above refreshed the entry
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.get("s-1").await.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(registry.get("s-1").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let registry = SessionRegistry::new(Duration::from_secs(600), 2);
        insert(&registry, "a").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        insert(&registry, "b").await;
        tokio::time::advance(Duration::from_secs(1)).await;

        // Touch "a" so "b" becomes the oldest
        assert!(registry.get("a").await.is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        insert(&registry, "c").await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.get("a").await.is_some());
        assert!(registry.get("b").await.is_none());
        assert!(registry.get("c").await.is_some());
    }
}
