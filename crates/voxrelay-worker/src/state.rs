//! Shared gateway state

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::engines::EngineFactory;
use crate::models::ModelManager;

const CLONE_CACHE_CAP: usize = 64;

/// Completed voice-clone results keyed by idempotency key, so a retried
/// request returns the original result instead of redoing the work.
/// Bounded: once the cap is reached the least recently used entry is
/// evicted. Keys are client-supplied, so the cap also limits how much
/// memory a misbehaving client can pin.
pub struct CloneCache {
    entries: HashMap<String, Bytes>,
    order: VecDeque<String>,
    cap: usize,
}

impl CloneCache {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        let data = self.entries.get(key).cloned()?;
        self.promote(key);
        Some(data)
    }

    pub fn insert(&mut self, key: String, data: Bytes) {
        if self.entries.insert(key.clone(), data).is_some() {
            self.promote(&key);
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn promote(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[derive(Clone)]
pub struct WorkerState {
    pub manager: Arc<ModelManager>,
    pub clone_results: Arc<Mutex<CloneCache>>,
}

impl WorkerState {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            manager: Arc::new(ModelManager::new(factory)),
            clone_results: Arc::new(Mutex::new(CloneCache::new(CLONE_CACHE_CAP))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_evicts_the_oldest_entry_at_the_cap() {
        let mut cache = CloneCache::new(3);
        for i in 0..4 {
            cache.insert(format!("key-{i}"), Bytes::from_static(b"wav"));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("key-0").is_none());
        assert!(cache.get("key-3").is_some());
    }

    #[test]
    fn recently_read_entries_survive_eviction() {
        let mut cache = CloneCache::new(2);
        cache.insert("a".to_string(), Bytes::from_static(b"1"));
        cache.insert("b".to_string(), Bytes::from_static(b"2"));
        assert!(cache.get("a").is_some());

        cache.insert("c".to_string(), Bytes::from_static(b"3"));
        assert!(cache.get("a").is_some(), "promoted entry stays");
        assert!(cache.get("b").is_none(), "least recently used entry goes");
    }

    #[test]
    fn reinserting_a_key_does_not_grow_the_cache() {
        let mut cache = CloneCache::new(2);
        cache.insert("a".to_string(), Bytes::from_static(b"1"));
        cache.insert("a".to_string(), Bytes::from_static(b"2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().as_ref(), b"2");
    }
}
