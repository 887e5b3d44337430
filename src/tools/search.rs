use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::settings::{BraveConfig, ExternalSearchConfig, NaverConfig};
use crate::core::errors::PipelineError;

/// Where a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Internal,
    Naver,
    DuckDuckGo,
    Brave,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Internal => "internal",
            Provider::Naver => "naver",
            Provider::DuckDuckGo => "duckduckgo",
            Provider::Brave => "brave",
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, Provider::Internal)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked search result. `score` is only comparable between hits of the
/// same provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub title: String,
    pub body: String,
    pub url: String,
    pub date: Option<String>,
    pub score: f32,
    pub provider: Provider,
}

/// Result of running the provider chain for one sub-query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExternalOutcome {
    /// First provider in the chain that answered without error.
    Hits { provider: Provider, hits: Vec<Hit> },
    /// Every provider failed.
    NoResult { reason: String },
}

impl ExternalOutcome {
    pub fn hits(&self) -> &[Hit] {
        match self {
            ExternalOutcome::Hits { hits, .. } => hits,
            ExternalOutcome::NoResult { .. } => &[],
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            ExternalOutcome::Hits { provider, .. } => Some(*provider),
            ExternalOutcome::NoResult { .. } => None,
        }
    }
}

pub type ExternalResults = HashMap<String, ExternalOutcome>;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn provider(&self) -> Provider;

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError>;
}

/// Instantiate the configured external providers in fallback order.
pub fn build_providers(
    config: &ExternalSearchConfig,
    client: Client,
) -> Vec<Arc<dyn SearchProvider>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
    for provider in &config.providers {
        match provider {
            Provider::Naver => providers.push(Arc::new(NaverNewsProvider::new(
                config.naver.clone(),
                client.clone(),
            ))),
            Provider::DuckDuckGo => {
                providers.push(Arc::new(DuckDuckGoProvider::new(client.clone())))
            }
            Provider::Brave => providers.push(Arc::new(BraveProvider::new(
                config.brave.clone(),
                client.clone(),
            ))),
            Provider::Internal => {
                tracing::warn!("'internal' is not an external search provider; skipping");
            }
        }
    }
    providers
}

/// Positional score for providers that do not report relevance.
fn rank_score(rank: usize) -> f32 {
    1.0 / (rank as f32 + 1.0)
}

pub struct NaverNewsProvider {
    config: NaverConfig,
    client: Client,
}

impl NaverNewsProvider {
    pub fn new(config: NaverConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl SearchProvider for NaverNewsProvider {
    fn provider(&self) -> Provider {
        Provider::Naver
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(PipelineError::Unavailable(
                "Naver API credentials are not configured".to_string(),
            ));
        };

        let url = format!(
            "{}?query={}&display={}&sort={}",
            self.config.endpoint,
            urlencoding::encode(query),
            top_k,
            urlencoding::encode(&self.config.sort)
        );

        let response = self
            .client
            .get(url)
            .header("X-Naver-Client-Id", client_id)
            .header("X-Naver-Client-Secret", client_secret)
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !response.status().is_success() {
            return Err(PipelineError::Unavailable(format!(
                "Naver search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        Ok(parse_naver_items(&payload, top_k))
    }
}

fn parse_naver_items(payload: &Value, top_k: usize) -> Vec<Hit> {
    let items = payload
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for item in items {
        let title = strip_tags(item.get("title").and_then(|v| v.as_str()).unwrap_or(""));
        let body = strip_tags(
            item.get("description")
                .and_then(|v| v.as_str())
                .unwrap_or(""),
        );
        let url = item
            .get("originallink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| item.get("link").and_then(|v| v.as_str()))
            .unwrap_or("")
            .to_string();
        let date = item
            .get("pubDate")
            .and_then(|v| v.as_str())
            .and_then(naver_date);

        if title.is_empty() && url.is_empty() {
            continue;
        }
        let score = rank_score(results.len());
        results.push(Hit {
            title,
            body,
            url,
            date,
            score,
            provider: Provider::Naver,
        });
        if results.len() >= top_k {
            break;
        }
    }
    results
}

/// `Mon, 15 Jan 2024 09:30:00 +0900` -> `2024-01-15`
fn naver_date(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

fn strip_tags(raw: &str) -> String {
    TAG_RE
        .replace_all(raw, "")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

pub struct DuckDuckGoProvider {
    client: Client,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn provider(&self) -> Provider {
        Provider::DuckDuckGo
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !response.status().is_success() {
            return Err(PipelineError::Unavailable(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        let mut results = parse_duckduckgo(&payload);
        results.truncate(top_k);
        Ok(results)
    }
}

fn parse_duckduckgo(payload: &Value) -> Vec<Hit> {
    let mut results = Vec::new();

    if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() && !url.is_empty() {
                let heading = payload
                    .get("Heading")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text));
                push_ddg_hit(&mut results, heading, url, abstract_text);
            }
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<Hit>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        push_ddg_hit(results, title, url, text);
    }
}

fn push_ddg_hit(results: &mut Vec<Hit>, title: &str, url: &str, body: &str) {
    let score = rank_score(results.len());
    results.push(Hit {
        title: title.to_string(),
        body: body.to_string(),
        url: url.to_string(),
        date: None,
        score,
        provider: Provider::DuckDuckGo,
    });
}

pub struct BraveProvider {
    config: BraveConfig,
    client: Client,
}

impl BraveProvider {
    pub fn new(config: BraveConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn provider(&self) -> Provider {
        Provider::Brave
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(PipelineError::Unavailable(
                "Brave API key is not configured".to_string(),
            ));
        };

        let url = format!(
            "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
            urlencoding::encode(query),
            top_k
        );

        let response = self
            .client
            .get(url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(PipelineError::unavailable)?;

        if !response.status().is_success() {
            return Err(PipelineError::Unavailable(format!(
                "Brave search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        let mut results = parse_brave(&payload);
        results.truncate(top_k);
        Ok(results)
    }
}

fn parse_brave(payload: &Value) -> Vec<Hit> {
    let mut results = Vec::new();

    if let Some(items) = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|v| v.as_array())
    {
        for item in items {
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = item
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let date = item
                .get("page_age")
                .and_then(|v| v.as_str())
                .map(|s| s.chars().take(10).collect::<String>());

            if !title.is_empty() && !url.is_empty() {
                let score = rank_score(results.len());
                results.push(Hit {
                    title: strip_tags(title),
                    body: strip_tags(snippet),
                    url: url.to_string(),
                    date,
                    score,
                    provider: Provider::Brave,
                });
            }
        }
    }

    results
}
