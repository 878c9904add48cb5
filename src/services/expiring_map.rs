//! Shared TTL registry.
//!
//! Both live-session and streaming-token state follow the same shape: a
//! string-keyed map guarded by one reader/writer lock, swept by a
//! background janitor on a fixed ticker. [`ExpiringMap`] factors that out,
//! parameterized by an expiry predicate and an async on-evict action.
//! The lock is never held across the on-evict I/O.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct ExpiringMap<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> Default for ExpiringMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExpiringMap<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert under a fresh key. Returns false (and leaves the map
    /// untouched) when the key is already present.
    #[must_use]
    pub fn insert(&self, key: String, value: V) -> bool {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        true
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.write().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Remove and return every entry for which `expired` holds.
    pub fn evict_expired<P>(&self, now: DateTime<Utc>, expired: P) -> Vec<(String, V)>
    where
        P: Fn(&V, DateTime<Utc>) -> bool,
    {
        let mut entries = self.entries.write().unwrap();
        let keys: Vec<String> = entries
            .iter()
            .filter(|(_, value)| expired(value, now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.into_iter()
            .filter_map(|key| entries.remove(&key).map(|value| (key, value)))
            .collect()
    }
}

impl<V: Clone> ExpiringMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().unwrap().get(key).cloned()
    }
}

impl<V: Send + Sync + 'static> ExpiringMap<V> {
    /// Spawn the background sweeper.
    ///
    /// Every `every`, expired entries are removed under the write lock and
    /// `on_evict` runs for each of them afterwards, with no lock held.
    pub fn spawn_janitor<P, F, Fut>(
        self: &Arc<Self>,
        every: Duration,
        expired: P,
        on_evict: F,
    ) -> JoinHandle<()>
    where
        P: Fn(&V, DateTime<Utc>) -> bool + Send + Sync + 'static,
        F: Fn(String, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let map = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = map.evict_expired(Utc::now(), &expired);
                for (key, value) in evicted {
                    on_evict(key, value).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn insert_rejects_colliding_keys() {
        let map = ExpiringMap::new();
        assert!(map.insert("a".into(), 1));
        assert!(!map.insert("a".into(), 2));
        assert_eq!(map.get("a"), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_returns_the_entry() {
        let map = ExpiringMap::new();
        assert!(map.insert("a".into(), 7));
        assert_eq!(map.remove("a"), Some(7));
        assert_eq!(map.remove("a"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn evict_expired_only_takes_matching_entries() {
        let map = ExpiringMap::new();
        let now = Utc::now();
        assert!(map.insert("old".into(), now - ChronoDuration::hours(3)));
        assert!(map.insert("fresh".into(), now));

        let evicted =
            map.evict_expired(now, |stamp, now| now - *stamp > ChronoDuration::hours(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "old");
        assert!(map.get("old").is_none());
        assert!(map.get("fresh").is_some());
    }
}
