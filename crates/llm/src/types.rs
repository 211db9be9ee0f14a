use serde::{Deserialize, Serialize};

/// Options that participate in the cache key alongside model/prompt/schema:
/// the key is a hash over every input that changes the output.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub seed: Option<i64>,
}

/// One call into the gateway: a prompt plus everything that determines its
/// cache key and safety limits.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Name of the JSON schema the response must validate against, if any.
    /// Included in the cache key so the same prompt requested under two
    /// different schemas never collides.
    pub schema_name: Option<String>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            schema_name: None,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }
}

/// A single streamed chunk from a provider, before safety inspection.
#[derive(Debug, Clone)]
pub struct GenerationChunk {
    pub text: String,
    pub done: bool,
}
