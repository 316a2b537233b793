use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheEntry, CacheProvider};

/// In-memory cache provider.
///
/// The default backend. Entries live in a concurrent map for the lifetime
/// of the process and are lost at exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheProvider for MemoryStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    async fn set(&self, key: &str, entry: &CacheEntry) {
        self.entries.insert(key.to_string(), entry.clone());
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: i64) -> CacheEntry {
        CacheEntry {
            data: json!(value),
            last_updated: 1_000,
        }
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("QueryCore_a").await, None);

        store.set("QueryCore_a", &entry(1)).await;
        assert_eq!(store.get("QueryCore_a").await, Some(entry(1)));
        assert_eq!(store.len(), 1);

        store.set("QueryCore_a", &entry(2)).await;
        assert_eq!(store.get("QueryCore_a").await, Some(entry(2)));
        assert_eq!(store.len(), 1);

        store.remove("QueryCore_a").await;
        assert_eq!(store.get("QueryCore_a").await, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.remove("QueryCore_missing").await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new();
        store.set("QueryCore_a", &entry(1)).await;
        store.set("QueryCore_b", &entry(2)).await;

        store.remove("QueryCore_a").await;
        assert_eq!(store.get("QueryCore_b").await, Some(entry(2)));
    }
}
