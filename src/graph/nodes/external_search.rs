// External Search Node
// Concurrent fan-out over insufficient sub-queries with a per-query provider
// fallback chain

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::core::errors::with_timeout;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::PipelineState;
use crate::pipeline::logger::PipelineLogger;
use crate::tools::search::{ExternalOutcome, ExternalResults, SearchProvider};

/// Sentinel reason stored when every provider failed for a sub-query.
pub const WEB_SEARCH_FAILED: &str = "웹 검색 실패";

pub struct ExternalSearchNode {
    providers: Vec<Arc<dyn SearchProvider>>,
    top_k: usize,
    max_workers: usize,
    timeout: Duration,
}

impl ExternalSearchNode {
    /// `providers` are tried in the given order for each sub-query.
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        top_k: usize,
        max_workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            providers,
            top_k,
            max_workers,
            timeout,
        }
    }
}

#[async_trait]
impl Node for ExternalSearchNode {
    fn id(&self) -> &'static str {
        "external_search"
    }

    fn name(&self) -> &'static str {
        "External Search"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let targets: Vec<String> = match &state.relevance {
            Some(relevance) if !relevance.insufficient_subqueries.is_empty() => {
                relevance.insufficient_subqueries.clone()
            }
            _ => state.sub_queries(),
        };

        let results = fan_out(
            &self.providers,
            &targets,
            self.top_k,
            self.max_workers,
            self.timeout,
            ctx.logger,
            ctx.run_id,
        )
        .await;

        let failed = results
            .values()
            .filter(|o| matches!(o, ExternalOutcome::NoResult { .. }))
            .count();
        let outcome = if failed == 0 {
            StageOutcome::Ok
        } else {
            StageOutcome::degraded(format!(
                "no provider answered for {} of {} sub-queries",
                failed,
                results.len()
            ))
        };

        for (query, outcome) in results {
            state.external_results.insert(query, outcome);
        }
        Ok(NodeOutput::next(outcome))
    }
}

/// Run the provider chain for each sub-query. Distinct sub-queries run
/// concurrently on at most `min(len, max_workers)` tasks; providers for the
/// same sub-query are tried strictly in order.
pub async fn fan_out(
    providers: &[Arc<dyn SearchProvider>],
    sub_queries: &[String],
    top_k: usize,
    max_workers: usize,
    timeout: Duration,
    logger: &dyn PipelineLogger,
    run_id: &str,
) -> ExternalResults {
    let width = sub_queries.len().min(max_workers).max(1);

    stream::iter(sub_queries.iter().cloned())
        .map(|query| async move {
            let outcome = search_with_fallback(providers, &query, top_k, timeout, logger, run_id).await;
            (query, outcome)
        })
        .buffer_unordered(width)
        .collect::<ExternalResults>()
        .await
}

/// The first provider that returns without error wins, even with zero hits.
pub async fn search_with_fallback(
    providers: &[Arc<dyn SearchProvider>],
    query: &str,
    top_k: usize,
    timeout: Duration,
    logger: &dyn PipelineLogger,
    run_id: &str,
) -> ExternalOutcome {
    let mut errors = Vec::new();

    for provider in providers {
        let id = provider.provider();
        match with_timeout(id.as_str(), timeout, provider.search(query, top_k)).await {
            Ok(mut hits) => {
                hits.truncate(top_k);
                for hit in &mut hits {
                    hit.provider = id;
                }
                logger.search(run_id, id, query, Ok(hits.len()));
                return ExternalOutcome::Hits { provider: id, hits };
            }
            Err(err) => {
                let message = err.to_string();
                logger.search(run_id, id, query, Err(&message));
                errors.push(format!("{}: {}", id, message));
            }
        }
    }

    let reason = if errors.is_empty() {
        format!("{} (no providers configured)", WEB_SEARCH_FAILED)
    } else {
        format!("{} ({})", WEB_SEARCH_FAILED, errors.join("; "))
    };
    ExternalOutcome::NoResult { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::PipelineError;
    use crate::pipeline::logger::NoopLogger;
    use crate::tools::search::{Hit, Provider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        id: Provider,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeProvider {
        fn new(id: Provider, fail: bool) -> Arc<Self> {
            Self::with_delay(id, fail, Duration::ZERO)
        }

        fn with_delay(id: Provider, fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail,
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        fn provider(&self) -> Provider {
            self.id
        }

        async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(PipelineError::unavailable("provider down"));
            }
            Ok((0..top_k + 3)
                .map(|i| Hit {
                    title: format!("{} {}", query, i),
                    body: String::new(),
                    url: format!("https://{}/{}/{}", self.id, query, i),
                    date: None,
                    score: 1.0,
                    provider: Provider::Internal,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_and_calls_primary_once() {
        let primary = FakeProvider::new(Provider::Naver, true);
        let secondary = FakeProvider::new(Provider::DuckDuckGo, false);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![primary.clone(), secondary.clone()];

        let outcome = search_with_fallback(
            &providers,
            "q",
            5,
            Duration::from_secs(1),
            &NoopLogger,
            "t",
        )
        .await;

        assert_eq!(outcome.provider(), Some(Provider::DuckDuckGo));
        assert_eq!(outcome.hits().len(), 5);
        assert!(outcome.hits().iter().all(|h| h.provider == Provider::DuckDuckGo));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_success_stops_the_chain() {
        let primary = FakeProvider::new(Provider::Naver, false);
        let secondary = FakeProvider::new(Provider::DuckDuckGo, false);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![primary.clone(), secondary.clone()];

        let outcome =
            search_with_fallback(&providers, "q", 2, Duration::from_secs(1), &NoopLogger, "t").await;

        assert_eq!(outcome.provider(), Some(Provider::Naver));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeouts_count_as_provider_failure() {
        let slow = FakeProvider::with_delay(Provider::Naver, false, Duration::from_secs(5));
        let fast = FakeProvider::new(Provider::Brave, false);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![slow, fast];

        let outcome = search_with_fallback(
            &providers,
            "q",
            1,
            Duration::from_millis(20),
            &NoopLogger,
            "t",
        )
        .await;

        assert_eq!(outcome.provider(), Some(Provider::Brave));
    }

    #[tokio::test]
    async fn all_failures_store_no_result_marker() {
        let providers: Vec<Arc<dyn SearchProvider>> = vec![
            FakeProvider::new(Provider::Naver, true),
            FakeProvider::new(Provider::DuckDuckGo, true),
        ];

        let outcome =
            search_with_fallback(&providers, "q", 5, Duration::from_secs(1), &NoopLogger, "t").await;

        match outcome {
            ExternalOutcome::NoResult { reason } => {
                assert!(reason.starts_with(WEB_SEARCH_FAILED));
                assert!(reason.contains("naver") && reason.contains("duckduckgo"));
            }
            other => panic!("expected NoResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fan_out_covers_every_sub_query_within_worker_cap() {
        let provider = FakeProvider::with_delay(Provider::Naver, false, Duration::from_millis(20));
        let providers: Vec<Arc<dyn SearchProvider>> = vec![provider.clone()];
        let queries: Vec<String> = (0..6).map(|i| format!("q{}", i)).collect();

        let results = fan_out(
            &providers,
            &queries,
            2,
            3,
            Duration::from_secs(1),
            &NoopLogger,
            "t",
        )
        .await;

        assert_eq!(results.len(), 6);
        assert!(queries.iter().all(|q| results[q].hits().len() == 2));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
        let peak = provider.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded cap", peak);
        assert!(peak >= 2, "sub-queries did not run concurrently");
    }
}
