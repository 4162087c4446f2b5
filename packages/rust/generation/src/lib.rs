//! Text generation capability.
//!
//! Components that can use a language model (the planner and the strategy
//! synthesizer) depend only on [`TextGeneration`]. The shipped
//! implementation, [`ChatCompletionsClient`], speaks the OpenAI-compatible
//! `/chat/completions` protocol; tests substitute in-memory fakes.

mod client;
pub mod prompts;

use async_trait::async_trait;
use serde_json::Value;

use siteadvisor_shared::Result;

pub use client::ChatCompletionsClient;

/// One generation call: instructions, input, and an optional output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// JSON schema the answer must follow. When set, the backend is asked
    /// for a JSON object.
    pub schema: Option<Value>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            schema: None,
            temperature: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Produces text for a request.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    /// Returns the raw answer text. Callers own parsing and validation.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Model or backend name for tracing.
    fn name(&self) -> &str;
}

/// Strip a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
