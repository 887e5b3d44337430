//! TTL + capacity-bounded result cache keyed by (query, session context).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::config::settings::CacheConfig;
use crate::graph::state::PipelineState;
use crate::llm::ChatMessage;

struct CacheEntry {
    result: PipelineState,
    created_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

/// Shared across concurrent runs. All bookkeeping happens under one lock,
/// so `get` and `set` are atomic per key.
pub struct QueryCache {
    inner: Mutex<Inner>,
    max_size: usize,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl())
    }

    /// Deterministic key: SHA-256 over the case-folded, trimmed query and the
    /// chat history, serialised with sorted object keys.
    pub fn cache_key(query: &str, chat_history: &[ChatMessage]) -> String {
        let payload = json!({
            "query": query.trim().to_lowercase(),
            "context": { "chat_history": chat_history },
        });
        let canonical = canonical_json(&payload);
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    pub fn get(&self, query: &str, chat_history: &[ChatMessage]) -> Option<PipelineState> {
        self.get_by_key(&Self::cache_key(query, chat_history))
    }

    pub fn get_by_key(&self, key: &str) -> Option<PipelineState> {
        let mut inner = self.lock();
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => now.duration_since(entry.created_at) > self.ttl,
        };

        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            return None;
        }

        let result = inner.entries.get_mut(key).map(|entry| {
            entry.last_accessed_at = now;
            entry.access_count += 1;
            entry.result.clone()
        });
        inner.hits += 1;
        result
    }

    pub fn set(&self, query: &str, chat_history: &[ChatMessage], result: PipelineState) {
        self.set_by_key(Self::cache_key(query, chat_history), result);
    }

    pub fn set_by_key(&self, key: String, result: PipelineState) {
        let mut inner = self.lock();
        let now = Instant::now();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                tracing::debug!(key = %oldest, "evicted least recently used cache entry");
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Drop every expired entry now rather than on the next lookup.
    pub fn remove_expired(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.created_at) <= ttl);
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.lock().entries.get(key).map(|e| e.access_count)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64
            },
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// JSON text with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn state(answer: &str) -> PipelineState {
        PipelineState {
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn key_normalizes_query_and_depends_on_history() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        assert_eq!(
            QueryCache::cache_key("  Rust NEWS ", &history),
            QueryCache::cache_key("rust news", &history)
        );
        assert_ne!(
            QueryCache::cache_key("rust news", &history),
            QueryCache::cache_key("rust news", &[])
        );
        assert_eq!(QueryCache::cache_key("q", &[]).len(), 64);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let a = json!({ "b": 1, "a": { "d": [1, { "z": 0, "y": 1 }], "c": "x" } });
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"c":"x","d":[1,{"y":1,"z":0}]},"b":1}"#
        );
    }

    #[test]
    fn get_counts_hits_and_misses() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        assert!(cache.get("q", &[]).is_none());
        cache.set("q", &[], state("a"));
        assert_eq!(cache.get("Q ", &[]).unwrap().answer, "a");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(cache.access_count(&QueryCache::cache_key("q", &[])), Some(1));
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        let cache = QueryCache::new(10, Duration::from_millis(20));
        cache.set("q", &[], state("a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("q", &[]).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_expired_sweeps_all_stale_entries() {
        let cache = QueryCache::new(10, Duration::from_millis(20));
        cache.set("a", &[], state("a"));
        cache.set("b", &[], state("b"));
        std::thread::sleep(Duration::from_millis(40));
        cache.set("c", &[], state("c"));
        assert_eq!(cache.remove_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_evicts_least_recently_accessed() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        cache.set("a", &[], state("a"));
        std::thread::sleep(Duration::from_millis(5));
        cache.set("b", &[], state("b"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a", &[]).is_some());
        cache.set("c", &[], state("c"));

        assert!(cache.get("a", &[]).is_some());
        assert!(cache.get("b", &[]).is_none());
        assert!(cache.get("c", &[]).is_some());
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let cache = QueryCache::new(1, Duration::from_secs(60));
        cache.set("a", &[], state("1"));
        cache.set("a", &[], state("2"));
        assert_eq!(cache.get("a", &[]).unwrap().answer, "2");
    }

    #[tokio::test]
    async fn concurrent_access_keeps_bookkeeping_consistent() {
        let cache = Arc::new(QueryCache::new(1000, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    let query = format!("q{}", (i * 50 + j) % 20);
                    if cache.get(&query, &[]).is_none() {
                        cache.set(&query, &[], state(&query));
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 400);
        assert_eq!(stats.size, 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);
    }
}
