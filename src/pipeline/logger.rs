//! Pipeline telemetry.
//!
//! The pipeline reports through `PipelineLogger`; the handle is passed in by
//! whoever builds the pipeline. `TracingLogger` emits structured `tracing`
//! events, `NoopLogger` drops everything.

use std::time::Duration;

use serde::Serialize;

use crate::graph::node::StageOutcome;
use crate::graph::state::{DecisionBasis, JudgeDecision};
use crate::tools::search::Provider;

/// Summary emitted once per completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub method: String,
    pub execution_ms: u128,
    pub sub_queries: usize,
    pub internal_hits: usize,
    pub relevance_score: f32,
    pub is_relevant_enough: bool,
    pub external_hits: usize,
    pub sources: usize,
    pub answer_chars: usize,
}

pub trait PipelineLogger: Send + Sync {
    fn query_start(&self, run_id: &str, query: &str);

    fn query_end(&self, run_id: &str, stats: &RunStats);

    fn stage(&self, run_id: &str, stage: &str, outcome: &StageOutcome, elapsed: Duration);

    fn decision(
        &self,
        run_id: &str,
        sub_query: &str,
        decision: JudgeDecision,
        basis: DecisionBasis,
    );

    /// One search call. `result` is the hit count or the failure message.
    fn search(&self, run_id: &str, provider: Provider, query: &str, result: Result<usize, &str>);

    fn cache_hit(&self, run_id: &str, key: &str);

    fn cache_miss(&self, run_id: &str, key: &str);

    fn error(&self, run_id: &str, stage: &str, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PipelineLogger for TracingLogger {
    fn query_start(&self, run_id: &str, query: &str) {
        tracing::info!(run_id, query, "query started");
    }

    fn query_end(&self, run_id: &str, stats: &RunStats) {
        tracing::info!(
            run_id,
            method = %stats.method,
            execution_ms = stats.execution_ms as u64,
            sub_queries = stats.sub_queries,
            internal_hits = stats.internal_hits,
            relevance_score = stats.relevance_score as f64,
            is_relevant_enough = stats.is_relevant_enough,
            external_hits = stats.external_hits,
            sources = stats.sources,
            answer_chars = stats.answer_chars,
            "query finished"
        );
    }

    fn stage(&self, run_id: &str, stage: &str, outcome: &StageOutcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            StageOutcome::Ok => {
                tracing::info!(run_id, stage, elapsed_ms, outcome = "ok", "stage finished")
            }
            StageOutcome::Degraded(reason) => tracing::warn!(
                run_id,
                stage,
                elapsed_ms,
                outcome = "degraded",
                reason = %reason,
                "stage degraded"
            ),
            StageOutcome::Failed(reason) => tracing::error!(
                run_id,
                stage,
                elapsed_ms,
                outcome = "failed",
                reason = %reason,
                "stage failed"
            ),
        }
    }

    fn decision(
        &self,
        run_id: &str,
        sub_query: &str,
        decision: JudgeDecision,
        basis: DecisionBasis,
    ) {
        tracing::info!(
            run_id,
            sub_query,
            decision = decision.as_str(),
            basis = basis.as_str(),
            "relevance decision"
        );
    }

    fn search(&self, run_id: &str, provider: Provider, query: &str, result: Result<usize, &str>) {
        match result {
            Ok(hits) => tracing::info!(
                run_id,
                provider = provider.as_str(),
                query,
                hits,
                "search completed"
            ),
            Err(message) => tracing::warn!(
                run_id,
                provider = provider.as_str(),
                query,
                error = message,
                "search failed"
            ),
        }
    }

    fn cache_hit(&self, run_id: &str, key: &str) {
        tracing::info!(run_id, key, "cache hit");
    }

    fn cache_miss(&self, run_id: &str, key: &str) {
        tracing::debug!(run_id, key, "cache miss");
    }

    fn error(&self, run_id: &str, stage: &str, message: &str) {
        tracing::error!(run_id, stage, message, "pipeline error");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl PipelineLogger for NoopLogger {
    fn query_start(&self, _run_id: &str, _query: &str) {}

    fn query_end(&self, _run_id: &str, _stats: &RunStats) {}

    fn stage(&self, _run_id: &str, _stage: &str, _outcome: &StageOutcome, _elapsed: Duration) {}

    fn decision(
        &self,
        _run_id: &str,
        _sub_query: &str,
        _decision: JudgeDecision,
        _basis: DecisionBasis,
    ) {
    }

    fn search(
        &self,
        _run_id: &str,
        _provider: Provider,
        _query: &str,
        _result: Result<usize, &str>,
    ) {
    }

    fn cache_hit(&self, _run_id: &str, _key: &str) {}

    fn cache_miss(&self, _run_id: &str, _key: &str) {}

    fn error(&self, _run_id: &str, _stage: &str, _message: &str) {}
}
