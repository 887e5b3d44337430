//! Top-level entry point: cache lookup, graph execution, response shaping.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde::Serialize;

use super::logger::{PipelineLogger, RunStats};
use crate::cache::QueryCache;
use crate::core::config::PipelineConfig;
use crate::graph::node::{GraphError, NodeContext, StageOutcome};
use crate::graph::{build_pipeline_graph, GraphRuntime, PipelineState};
use crate::llm::{ChatMessage, LlmProvider};
use crate::rag::{InternalSearch, Source};
use crate::tools::SearchProvider;

pub const PIPELINE_ERROR_PREFIX: &str = "요청을 처리하는 중 오류가 발생했습니다";
pub const EMPTY_QUERY_ANSWER: &str = "질문이 비어 있습니다. 질문을 입력해 주세요.";

/// Which path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Integrated,
    CacheHit,
    Error,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Integrated => "integrated",
            Method::CacheHit => "cache_hit",
            Method::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub internal: usize,
    pub external: usize,
    pub sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub method: Method,
    pub sub_queries: Vec<String>,
    pub is_relevant_enough: bool,
    pub relevance_score: f32,
    pub source_counts: SourceCounts,
    pub sources: Vec<Source>,
}

impl QueryResponse {
    fn from_state(state: &PipelineState, method: Method) -> Self {
        Self {
            answer: state.answer.clone(),
            method,
            sub_queries: state.sub_queries(),
            is_relevant_enough: state.is_relevant_enough(),
            relevance_score: state.relevance_score(),
            source_counts: SourceCounts {
                internal: state.internal_hit_count(),
                external: state.external_hit_count(),
                sources: state.sources.len(),
            },
            sources: state.sources.clone(),
        }
    }

    /// Well-formed failure result: message in `answer`, everything else empty.
    pub fn error(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            method: Method::Error,
            sub_queries: Vec::new(),
            is_relevant_enough: false,
            relevance_score: 0.0,
            source_counts: SourceCounts::default(),
            sources: Vec::new(),
        }
    }
}

/// External capabilities the pipeline depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    /// `None` runs without an internal store; every query then goes to the web.
    pub internal: Option<Arc<dyn InternalSearch>>,
    /// Web providers in fallback priority order.
    pub providers: Vec<Arc<dyn SearchProvider>>,
}

pub struct RagPipeline {
    graph: GraphRuntime,
    cache: Arc<QueryCache>,
    cache_enabled: bool,
    logger: Arc<dyn PipelineLogger>,
}

impl RagPipeline {
    pub fn new(
        config: &PipelineConfig,
        collaborators: Collaborators,
        cache: Arc<QueryCache>,
        logger: Arc<dyn PipelineLogger>,
    ) -> Result<Self, GraphError> {
        let graph = build_pipeline_graph(
            config,
            collaborators.llm,
            collaborators.internal,
            collaborators.providers,
        )?;
        Ok(Self {
            graph,
            cache,
            cache_enabled: config.cache.enabled,
            logger,
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Answer one query. Never fails: faults come back as a `Method::Error`
    /// response whose `answer` explains what went wrong.
    pub async fn run_query(&self, user_query: &str, chat_history: &[ChatMessage]) -> QueryResponse {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        self.logger.query_start(&run_id, user_query);

        if user_query.trim().is_empty() {
            self.logger.error(&run_id, "input", "empty query");
            let response = QueryResponse::error(EMPTY_QUERY_ANSWER);
            self.finish(&run_id, started, &response);
            return response;
        }

        let key = QueryCache::cache_key(user_query, chat_history);
        if self.cache_enabled {
            if let Some(cached) = self.cache.get_by_key(&key) {
                self.logger.cache_hit(&run_id, &key);
                let response = QueryResponse::from_state(&cached, Method::CacheHit);
                self.finish(&run_id, started, &response);
                return response;
            }
            self.logger.cache_miss(&run_id, &key);
        }

        let mut state = PipelineState::new(user_query, chat_history.to_vec());
        let ctx = NodeContext {
            logger: self.logger.as_ref(),
            run_id: &run_id,
        };

        let run = AssertUnwindSafe(self.graph.run(&mut state, &ctx))
            .catch_unwind()
            .await;

        let response = match run {
            Ok(Ok(report)) => {
                let failed = report
                    .stages
                    .iter()
                    .any(|stage| matches!(stage.outcome, StageOutcome::Failed(_)));
                if self.cache_enabled && !failed {
                    self.cache.set_by_key(key, state.clone());
                }
                QueryResponse::from_state(&state, Method::Integrated)
            }
            Ok(Err(err)) => {
                self.logger.error(
                    &run_id,
                    &err.node_id,
                    &format!("{} (trace: {})", err.message, err.execution_trace.join(" -> ")),
                );
                QueryResponse::error(format!("{}: {}", PIPELINE_ERROR_PREFIX, err.message))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.logger.error(&run_id, "runtime", &message);
                QueryResponse::error(format!("{}: {}", PIPELINE_ERROR_PREFIX, message))
            }
        };

        self.finish(&run_id, started, &response);
        response
    }

    fn finish(&self, run_id: &str, started: Instant, response: &QueryResponse) {
        let stats = RunStats {
            method: response.method.as_str().to_string(),
            execution_ms: started.elapsed().as_millis(),
            sub_queries: response.sub_queries.len(),
            internal_hits: response.source_counts.internal,
            relevance_score: response.relevance_score,
            is_relevant_enough: response.is_relevant_enough,
            external_hits: response.source_counts.external,
            sources: response.source_counts.sources,
            answer_chars: response.answer.chars().count(),
        };
        self.logger.query_end(run_id, &stats);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_response_is_zeroed_with_message() {
        let response = QueryResponse::error("boom");
        assert_eq!(response.answer, "boom");
        assert_eq!(response.method, Method::Error);
        assert!(response.sub_queries.is_empty() && response.sources.is_empty());
        assert_eq!(response.source_counts, SourceCounts::default());
    }

    #[test]
    fn response_serialises_method_label() {
        let value = serde_json::to_value(QueryResponse::error("x")).unwrap();
        assert_eq!(value["method"], json!("error"));
        assert_eq!(value["source_counts"]["external"], json!(0));
        assert_eq!(Method::CacheHit.as_str(), "cache_hit");
        assert_eq!(serde_json::to_value(Method::CacheHit).unwrap(), json!("cache_hit"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
