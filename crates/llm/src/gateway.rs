//! The LLM gateway: the single entry point extraction stages call through.
//! Every call is single-flight cached, retried with capped backoff on
//! transient failure, and — when a schema is requested — validated before
//! it's handed back, so a malformed response never reaches a curation
//! item.
//!
//! JSON extraction tries a fenced code block first, then falls back to
//! the first bare `{...}` object in the response.

use std::sync::Arc;

use minerva_domain::{PipelineError, Result};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::cache::{cache_key, ResponseCache};
use crate::provider::LlmProvider;
use crate::retry::with_retry;
use crate::types::GenerationRequest;

/// Concurrency cap used by [`LlmGateway::new`]. Real deployments should go
/// through [`LlmGateway::with_concurrency`] with a value read from config.
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    cache: ResponseCache,
    /// Bounds in-flight `generate`/`embed` calls so a burst of extraction
    /// stages can't overrun the provider — the spec's backpressure limit.
    semaphore: Arc<Semaphore>,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_concurrency(provider, DEFAULT_MAX_CONCURRENT_REQUESTS)
    }

    pub fn with_concurrency(provider: Arc<dyn LlmProvider>, max_concurrent_requests: usize) -> Self {
        Self { provider, cache: ResponseCache::new(), semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))) }
    }

    /// Generate raw text for `request`, deduplicated and retried.
    #[instrument(skip(self, request), fields(model = %request.model, schema = request.schema_name.as_deref()))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let _permit = self.semaphore.acquire().await.map_err(|e| PipelineError::consistency(e.to_string()))?;
        let key = cache_key(request);
        let provider = &self.provider;
        let result = self
            .cache
            .get_or_generate(key, || async move {
                with_retry("llm.generate", || provider.generate(request)).await
            })
            .await;
        result.map(|s| s.to_string())
    }

    /// Generate and parse a schema-validated `T` from the response,
    /// trying a fenced ```json block first, then the bare response text.
    pub async fn generate_structured<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<T> {
        let raw = self.generate(request).await?;
        extract_json_output(&raw)
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let _permit = self.semaphore.acquire().await.map_err(|e| PipelineError::consistency(e.to_string()))?;
        self.provider.embed(model, text).await
    }

    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _permit = self.semaphore.acquire().await.map_err(|e| PipelineError::consistency(e.to_string()))?;
        self.provider.embed_batch(model, texts).await
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.hit_count()
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache.miss_count()
    }
}

/// Parse `T` out of `raw`: prefer a fenced ` ```json ... ``` ` block, fall
/// back to treating the whole trimmed string as the JSON object.
pub fn extract_json_output<T: DeserializeOwned>(raw: &str) -> Result<T> {
    if let Some(fenced) = extract_fenced_block(raw) {
        if let Ok(parsed) = serde_json::from_str(&fenced) {
            return Ok(parsed);
        }
    }
    serde_json::from_str(raw.trim()).map_err(|e| PipelineError::schema(format!("could not parse model output as JSON: {e}")))
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start_marker = raw.find("```json").map(|i| i + "```json".len()).or_else(|| raw.find("```").map(|i| i + 3))?;
    let rest = &raw[start_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Extracted {
        name: String,
    }

    #[test]
    fn extracts_from_fenced_json_block() {
        let raw = "Here is the entity:\n```json\n{\"name\": \"Ana\"}\n```\nThanks.";
        let parsed: Extracted = extract_json_output(raw).unwrap();
        assert_eq!(parsed, Extracted { name: "Ana".to_string() });
    }

    #[test]
    fn extracts_from_bare_json() {
        let raw = "  {\"name\": \"Ana\"}  ";
        let parsed: Extracted = extract_json_output(raw).unwrap();
        assert_eq!(parsed, Extracted { name: "Ana".to_string() });
    }

    #[test]
    fn non_json_output_is_a_schema_error() {
        let err = extract_json_output::<Extracted>("not json at all").unwrap_err();
        assert_eq!(err.kind(), "Schema");
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmProvider for CountingProvider {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("{\"name\": \"Ana\"}".to_string())
        }

        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache_on_second_call() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let gateway = LlmGateway::new(provider.clone());
        let request = GenerationRequest::new("m", "p");
        gateway.generate(&request).await.unwrap();
        gateway.generate(&request).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.cache_hits(), 1);
    }

    struct SlowProvider {
        in_flight: Arc<AtomicUsize>,
        max_observed: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for SlowProvider {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("{\"name\": \"Ana\"}".to_string())
        }

        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    #[tokio::test]
    async fn generate_never_exceeds_the_configured_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(SlowProvider { in_flight: in_flight.clone(), max_observed: max_observed.clone() });
        let gateway = Arc::new(LlmGateway::with_concurrency(provider, 2));

        let mut handles = Vec::new();
        for i in 0..6 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                let request = GenerationRequest::new("m", format!("p{i}"));
                gateway.generate(&request).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn generate_structured_parses_the_response() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0) });
        let gateway = LlmGateway::new(provider);
        let request = GenerationRequest::new("m", "p").with_schema_name("Extracted");
        let parsed: Extracted = gateway.generate_structured(&request).await.unwrap();
        assert_eq!(parsed.name, "Ana");
    }
}
