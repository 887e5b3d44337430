use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use super::provider::{Embedder, LlmProvider};
use super::types::ChatRequest;
use crate::core::config::settings::LlmConfig;
use crate::core::errors::PipelineError;

/// Client for any server speaking the OpenAI `/v1` chat and embeddings API.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig, client: Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            client,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        if self.base_url.ends_with("/v1") {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/v1/{}", self.base_url, path)
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, PipelineError> {
        let url = self.endpoint("chat/completions");
        let body = chat_body(&self.model, &request);

        let res = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Unavailable(format!(
                "chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        extract_chat_content(&payload)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let url = self.endpoint("embeddings");
        let model = self.embedding_model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "input": inputs,
        });

        let res = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::Unavailable(format!(
                "embedding request failed: {}",
                text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        Ok(extract_embeddings(&payload))
    }
}

fn chat_body(model: &str, request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
        "stream": false,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(t) = request.temperature {
            obj.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            obj.insert("max_tokens".to_string(), json!(t));
        }
        if request.json_mode {
            obj.insert(
                "response_format".to_string(),
                json!({ "type": "json_object" }),
            );
        }
    }
    body
}

fn extract_chat_content(payload: &Value) -> Result<String, PipelineError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::Malformed("completion has no message content".to_string()))
}

fn extract_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let mut embeddings = Vec::new();
    if let Some(data) = payload["data"].as_array() {
        for item in data {
            if let Some(vals) = item["embedding"].as_array() {
                let vec: Vec<f32> = vals
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                embeddings.push(vec);
            }
        }
    }
    embeddings
}
