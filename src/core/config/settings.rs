//! Typed pipeline configuration.
//!
//! Every section is `#[serde(default)]` so a partial `config.yml` only needs
//! the keys it wants to change.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{default_citation_markers, default_providers, default_recency_keywords};
use crate::tools::search::Provider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub analysis: AnalysisConfig,
    pub internal_search: InternalSearchConfig,
    pub relevance: RelevanceConfig,
    pub external_search: ExternalSearchConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
    pub llm: LlmConfig,
    pub timeouts: TimeoutConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub recency_keywords: Vec<String>,
    pub max_sub_queries: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recency_keywords: default_recency_keywords(),
            max_sub_queries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalSearchConfig {
    pub top_k: usize,
    pub elasticsearch: Option<ElasticsearchConfig>,
}

impl Default for InternalSearchConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            elasticsearch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    /// Rank constant for reciprocal rank fusion.
    pub rrf_k: f32,
    pub num_candidates: usize,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            index: "rag_news_db".to_string(),
            rrf_k: 60.0,
            num_candidates: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// Number of internal hits quoted in the judge prompt.
    pub top_hits: usize,
    pub snippet_chars: usize,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            top_hits: 3,
            snippet_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSearchConfig {
    /// Providers in fallback priority order.
    pub providers: Vec<Provider>,
    pub top_k: usize,
    pub max_workers: usize,
    pub naver: NaverConfig,
    pub brave: BraveConfig,
}

impl Default for ExternalSearchConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            top_k: 5,
            max_workers: 10,
            naver: NaverConfig::default(),
            brave: BraveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NaverConfig {
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub sort: String,
}

impl Default for NaverConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openapi.naver.com/v1/search/news.json".to_string(),
            client_id: None,
            client_secret: None,
            sort: "date".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BraveConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_sources: usize,
    /// Fixed score given to every web source in the source listing.
    pub external_source_score: f32,
    pub internal_hits_per_query: usize,
    pub snippet_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_sources: 10,
            external_source_score: 0.9,
            internal_hits_per_query: 3,
            snippet_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub citation_markers: Vec<String>,
    pub verify_answer: bool,
    pub verification_context_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            citation_markers: default_citation_markers(),
            verify_answer: false,
            verification_context_chars: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible server (LM Studio, Ollama `/v1`, vLLM, ...).
    pub base_url: String,
    pub model: String,
    pub embedding_model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "default".to_string(),
            embedding_model: None,
            api_key: None,
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub llm_secs: u64,
    pub search_secs: u64,
    pub internal_search_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: 60,
            search_secs: 10,
            internal_search_secs: 15,
        }
    }
}

impl TimeoutConfig {
    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn internal_search(&self) -> Duration {
        Duration::from_secs(self.internal_search_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file: true,
        }
    }
}
