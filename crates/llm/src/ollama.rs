//! Ollama backend: streams `/api/generate` line-delimited JSON chunks,
//! applying the token/wall-clock caps and degenerate-output detectors as
//! each chunk arrives, and calls `/api/embeddings` for vectors.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use minerva_domain::{PipelineError, Result};
use serde::{Deserialize, Serialize};

use crate::provider::LlmProvider;
use crate::safety::{is_degenerate, MAX_GENERATION_TIME, MAX_TOKENS};
use crate::types::GenerationRequest;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Deserialize)]
struct GenerateChunk {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: true,
            options: OllamaOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                seed: request.options.seed,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::transport(format!("ollama returned status {}", response.status())));
        }

        let start = Instant::now();
        let mut accumulated = String::new();
        let mut token_count = 0usize;
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(frame) = byte_stream.next().await {
            let frame = frame.map_err(|e| PipelineError::transport(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&frame));

            while let Some(newline_at) = buffer.find('\n') {
                let line = buffer[..newline_at].to_string();
                buffer.drain(..=newline_at);
                if line.trim().is_empty() {
                    continue;
                }
                let chunk: GenerateChunk = serde_json::from_str(&line).map_err(|e| PipelineError::schema(e.to_string()))?;
                accumulated.push_str(&chunk.response);
                token_count += 1;

                if token_count > MAX_TOKENS {
                    return Err(PipelineError::budget(format!("generation exceeded {MAX_TOKENS} tokens")));
                }
                if start.elapsed() > MAX_GENERATION_TIME {
                    return Err(PipelineError::deadline_exceeded(format!(
                        "generation exceeded {:?}",
                        MAX_GENERATION_TIME
                    )));
                }
                if is_degenerate(&accumulated) {
                    return Err(PipelineError::schema("generation produced degenerate repeated/low-entropy output"));
                }
                if chunk.done {
                    return Ok(accumulated);
                }
            }
        }

        // The stream ended without a `done: true` chunk. Ollama can drop a
        // connection mid-response under load; treat empty output the same
        // as a transport failure so the caller retries instead of curating
        // nothing.
        if accumulated.is_empty() {
            return Err(PipelineError::transport("ollama stream ended with no output"));
        }
        Ok(accumulated)
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbedBody { model, prompt: text })
            .send()
            .await
            .map_err(|e| PipelineError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::transport(format!("ollama embeddings returned status {}", response.status())));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| PipelineError::schema(e.to_string()))?;
        Ok(parsed.embedding)
    }
}
