//! LLM gateway: single-flight caching, retry with capped backoff,
//! streaming safety caps, and schema-validated structured output over a
//! pluggable [`LlmProvider`] backend.

pub mod cache;
pub mod gateway;
pub mod ollama;
pub mod provider;
pub mod retry;
pub mod safety;
pub mod types;

pub use cache::{cache_key, ResponseCache};
pub use gateway::{extract_json_output, LlmGateway};
pub use ollama::OllamaProvider;
pub use provider::LlmProvider;
pub use types::{GenerationChunk, GenerationOptions, GenerationRequest};
