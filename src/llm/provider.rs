use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::PipelineError;

/// Text generation capability. May fail; callers decide how to degrade.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name used in logs (e.g. "openai_compat")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, PipelineError>;
}

/// Text to vector capability, consumed only by internal search backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}
