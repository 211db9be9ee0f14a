use async_trait::async_trait;
use minerva_domain::Result;

use crate::types::GenerationRequest;

/// A backend capable of text generation and embeddings. The gateway
/// ([`crate::gateway::LlmGateway`]) is provider-agnostic; swapping models
/// or backends never touches extraction or curation code.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete response for `request`, enforcing the token
    /// and wall-clock caps and aborting on degenerate output internally.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(model, text).await?);
        }
        Ok(out)
    }
}
