use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Identity of a provider request for memoization purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub credential: String,
}

/// Short-lived memo of successful fetches, so repeated renders within one poll interval
/// do not hit the provider again. A zero TTL disables it.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: tokio::sync::Mutex<HashMap<K, CachedEntry<V>>>,
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    fetched_at: Instant,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let mut guard = self.entries.lock().await;
        match guard.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut guard = self.entries.lock().await;
        let ttl = self.ttl;
        guard.retain(|_, e| e.fetched_at.elapsed() < ttl);
        guard.insert(
            key,
            CachedEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}
