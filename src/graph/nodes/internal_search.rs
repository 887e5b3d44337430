// Internal Search Node
// Runs every sub-query against the internal knowledge store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::with_timeout;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::PipelineState;
use crate::rag::store::{HitsByQuery, InternalSearch};
use crate::tools::search::Provider;

pub struct InternalSearchNode {
    store: Option<Arc<dyn InternalSearch>>,
    top_k: usize,
    timeout: Duration,
}

impl InternalSearchNode {
    /// `store` may be `None` when no internal index is configured; the stage
    /// then reports empty results for every sub-query.
    pub fn new(store: Option<Arc<dyn InternalSearch>>, top_k: usize, timeout: Duration) -> Self {
        Self {
            store,
            top_k,
            timeout,
        }
    }
}

#[async_trait]
impl Node for InternalSearchNode {
    fn id(&self) -> &'static str {
        "internal_search"
    }

    fn name(&self) -> &'static str {
        "Internal Search"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let sub_queries = state.sub_queries();

        let (mut results, outcome) = match &self.store {
            None => (
                HitsByQuery::new(),
                StageOutcome::degraded("internal store not configured"),
            ),
            Some(store) => {
                match with_timeout(
                    "internal search",
                    self.timeout,
                    store.search(&sub_queries, self.top_k),
                )
                .await
                {
                    Ok(results) => (results, StageOutcome::Ok),
                    Err(err) => {
                        ctx.logger.error(ctx.run_id, self.id(), &err.to_string());
                        (
                            HitsByQuery::new(),
                            StageOutcome::degraded(format!("internal store unavailable: {}", err)),
                        )
                    }
                }
            }
        };

        // Only this run's sub-queries, each present even when empty.
        results.retain(|query, _| sub_queries.contains(query));
        for query in &sub_queries {
            let hits = results.entry(query.clone()).or_default();
            hits.truncate(self.top_k);
            if self.store.is_some() && outcome.is_ok() {
                ctx.logger
                    .search(ctx.run_id, Provider::Internal, query, Ok(hits.len()));
            }
        }

        state.internal_results = results;
        tracing::debug!(total_hits = state.internal_hit_count(), "internal search done");
        Ok(NodeOutput::next(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::PipelineError;
    use crate::graph::state::QueryAnalysis;
    use crate::pipeline::logger::NoopLogger;
    use crate::tools::search::Hit;

    struct FixedStore;

    #[async_trait]
    impl InternalSearch for FixedStore {
        async fn search(
            &self,
            sub_queries: &[String],
            _top_k: usize,
        ) -> Result<HitsByQuery, PipelineError> {
            let mut out = HitsByQuery::new();
            let hit = |n: usize| Hit {
                title: format!("doc{}", n),
                body: String::new(),
                url: format!("https://db/{}", n),
                date: None,
                score: 1.0 / (n as f32 + 1.0),
                provider: Provider::Internal,
            };
            out.insert(sub_queries[0].clone(), (0..5).map(hit).collect());
            out.insert("stray".to_string(), vec![hit(9)]);
            Ok(out)
        }
    }

    struct DownStore;

    #[async_trait]
    impl InternalSearch for DownStore {
        async fn search(&self, _: &[String], _: usize) -> Result<HitsByQuery, PipelineError> {
            Err(PipelineError::unavailable("connection refused"))
        }
    }

    fn state_with(sub_queries: &[&str]) -> PipelineState {
        let mut state = PipelineState::new("q", Vec::new());
        state.query_analysis = Some(QueryAnalysis {
            sub_queries: sub_queries.iter().map(|s| s.to_string()).collect(),
            ..QueryAnalysis::fallback("q")
        });
        state
    }

    #[tokio::test]
    async fn missing_store_yields_empty_results_per_sub_query() {
        let node = InternalSearchNode::new(None, 10, Duration::from_secs(1));
        let mut state = state_with(&["a", "b"]);
        let logger = NoopLogger;
        let ctx = NodeContext { logger: &logger, run_id: "t" };

        let output = node.execute(&mut state, &ctx).await.unwrap();

        assert!(matches!(output.outcome, StageOutcome::Degraded(_)));
        assert_eq!(state.internal_results.len(), 2);
        assert!(state.internal_results.values().all(|hits| hits.is_empty()));
    }

    #[tokio::test]
    async fn results_are_trimmed_to_top_k_and_this_runs_queries() {
        let node = InternalSearchNode::new(Some(Arc::new(FixedStore)), 3, Duration::from_secs(1));
        let mut state = state_with(&["a", "b"]);
        let logger = NoopLogger;
        let ctx = NodeContext { logger: &logger, run_id: "t" };

        let output = node.execute(&mut state, &ctx).await.unwrap();

        assert_eq!(output.outcome, StageOutcome::Ok);
        assert_eq!(state.internal_results["a"].len(), 3);
        assert_eq!(state.internal_results["a"][0].title, "doc0");
        assert!(state.internal_results["b"].is_empty());
        assert!(!state.internal_results.contains_key("stray"));
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty() {
        let node = InternalSearchNode::new(Some(Arc::new(DownStore)), 3, Duration::from_secs(1));
        let mut state = state_with(&["a"]);
        let logger = NoopLogger;
        let ctx = NodeContext { logger: &logger, run_id: "t" };

        let output = node.execute(&mut state, &ctx).await.unwrap();

        assert!(matches!(output.outcome, StageOutcome::Degraded(ref r) if r.contains("connection refused")));
        assert!(state.internal_results["a"].is_empty());
    }
}
