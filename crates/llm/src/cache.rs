//! Single-flight response cache: concurrent requests with an identical
//! cache key share one in-flight generation instead of each calling the
//! model, and a completed result is served straight out of the cache on
//! the next identical call.
//!
//! The cache key is a SHA-256 hash over the JSON-serialized
//! `{model, prompt, system_prompt, schema_name, options}` tuple. Eviction
//! is a plain `lru::LruCache`, with hit/miss counters tracked alongside
//! it for observability.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};

use crate::types::GenerationRequest;

const DEFAULT_CAPACITY: usize = 512;

pub fn cache_key(request: &GenerationRequest) -> String {
    #[derive(serde::Serialize)]
    struct KeyInput<'a> {
        model: &'a str,
        prompt: &'a str,
        system_prompt: &'a Option<String>,
        schema_name: &'a Option<String>,
        options: &'a crate::types::GenerationOptions,
    }
    let input = KeyInput {
        model: &request.model,
        prompt: &request.prompt,
        system_prompt: &request.system_prompt,
        schema_name: &request.schema_name,
        options: &request.options,
    };
    let json = serde_json::to_string(&input).expect("GenerationRequest key input is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

type CacheSlot = Arc<OnceCell<Arc<str>>>;

pub struct ResponseCache {
    slots: Mutex<LruCache<String, CacheSlot>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Return the cached response for `key`, or run `generate` exactly
    /// once across every concurrent caller sharing that key and cache the
    /// result.
    pub async fn get_or_generate<F, Fut, E>(&self, key: String, generate: F) -> Result<Arc<str>, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String, E>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            if let Some(existing) = slots.get(&key) {
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                existing.clone()
            } else {
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let slot: CacheSlot = Arc::new(OnceCell::new());
                slots.put(key, slot.clone());
                slot
            }
        };

        slot.get_or_try_init(|| async { generate().await.map(|s| Arc::from(s.as_str())) })
            .await
            .cloned()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cache_key_is_stable_for_identical_requests() {
        let a = GenerationRequest::new("llama3.1:8b", "hello");
        let b = GenerationRequest::new("llama3.1:8b", "hello");
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn cache_key_differs_when_schema_name_differs() {
        let a = GenerationRequest::new("m", "p").with_schema_name("EntitySchema");
        let b = GenerationRequest::new("m", "p").with_schema_name("RelationSchema");
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[tokio::test]
    async fn concurrent_identical_keys_generate_exactly_once() {
        let cache = Arc::new(ResponseCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_generate::<_, _, std::convert::Infallible>("k".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok("generated".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for h in handles {
            let result = h.await.unwrap();
            assert_eq!(&*result, "generated");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_call_is_a_cache_hit() {
        let cache = ResponseCache::new();
        cache
            .get_or_generate::<_, _, std::convert::Infallible>("k".to_string(), || async { Ok("v".to_string()) })
            .await
            .unwrap();
        cache
            .get_or_generate::<_, _, std::convert::Infallible>("k".to_string(), || async { Ok("v".to_string()) })
            .await
            .unwrap();
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);
    }
}
