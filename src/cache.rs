//! Injected byte cache for avatars and message media.
//!
//! Each session gets its own cache handle; nothing here is process-global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Cache key: remote URL or service asset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Url(String),
    Asset(String),
}

/// Key -> bytes store.
pub trait MediaCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;
    fn set(&self, key: CacheKey, data: Vec<u8>);
}

/// Unbounded in-memory cache.
#[derive(Clone, Default)]
pub struct MemoryMediaCache {
    inner: Arc<Mutex<HashMap<CacheKey, Vec<u8>>>>,
}

impl MemoryMediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MediaCache for MemoryMediaCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    fn set(&self, key: CacheKey, data: Vec<u8>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(key, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_get_set() {
        let cache = MemoryMediaCache::new();
        let key = CacheKey::Url("https://example.com/a.png".to_string());
        assert!(cache.get(&key).is_none());

        cache.set(key.clone(), vec![1, 2, 3]);
        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));

        // URL and asset keys never collide.
        assert!(cache
            .get(&CacheKey::Asset("https://example.com/a.png".to_string()))
            .is_none());
    }

    #[test]
    fn test_memory_cache_clones_share_storage() {
        let cache = MemoryMediaCache::new();
        let other = cache.clone();
        other.set(CacheKey::Asset("x".to_string()), vec![9]);
        assert_eq!(cache.len(), 1);
    }
}
