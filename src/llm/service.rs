use std::sync::Arc;
use std::time::Duration;

use crate::core::config::settings::LlmConfig;
use crate::core::errors::{with_timeout, PipelineError};
use crate::llm::provider::LlmProvider;
use crate::llm::types::ChatRequest;

/// Generation capability as the pipeline stages see it: the provider plus
/// sampling defaults and a hard per-call deadline.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
    timeout: Duration,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig, timeout: Duration) -> Self {
        Self {
            provider,
            config,
            timeout,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// `what` names the call in timeout errors and logs.
    pub async fn chat(&self, what: &str, request: ChatRequest) -> Result<String, PipelineError> {
        let request = request.with_config(&self.config);
        let result = with_timeout(what, self.timeout, self.provider.chat(request)).await;
        if let Err(err) = &result {
            tracing::warn!(
                provider = self.provider.name(),
                call = what,
                "LLM call failed: {}",
                err
            );
        }
        result
    }
}
