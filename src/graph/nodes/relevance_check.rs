// Relevance Check Node
// Decides per sub-query whether internal evidence suffices; the only branch
// point of the pipeline

use async_trait::async_trait;

use crate::core::config::settings::RelevanceConfig;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::{
    DecisionBasis, JudgeDecision, PipelineState, Relevance, SubQueryDecision,
};
use crate::llm::{ChatRequest, LlmService};
use crate::rag::sources::truncate_chars;
use crate::tools::search::Hit;

pub const ROUTE_EXTERNAL: &str = "external";
pub const ROUTE_SUFFICIENT: &str = "sufficient";

pub struct RelevanceCheckNode {
    llm: LlmService,
    config: RelevanceConfig,
}

impl RelevanceCheckNode {
    pub fn new(llm: LlmService, config: RelevanceConfig) -> Self {
        Self { llm, config }
    }

    async fn judge(&self, sub_query: &str, hits: &[Hit]) -> Result<JudgeDecision, String> {
        let prompt = judge_prompt(sub_query, hits, &self.config);
        self.llm
            .chat("relevance judge", ChatRequest::prompt(prompt))
            .await
            .map(|text| parse_judge_decision(&text))
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Node for RelevanceCheckNode {
    fn id(&self) -> &'static str {
        "relevance_check"
    }

    fn name(&self) -> &'static str {
        "Relevance Check"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let sub_queries = state.sub_queries();
        let override_active = state.recency_hint
            || state
                .query_analysis
                .as_ref()
                .is_some_and(|a| a.needs_web_search);

        let mut decisions = Vec::with_capacity(sub_queries.len());
        let mut judge_failures = Vec::new();

        for sub_query in &sub_queries {
            let hits = state
                .internal_results
                .get(sub_query)
                .map(|h| h.as_slice())
                .unwrap_or(&[]);

            let (decision, basis) = if override_active {
                (JudgeDecision::Web, DecisionBasis::RecencyOverride)
            } else if hits.is_empty() {
                (JudgeDecision::Web, DecisionBasis::NoInternalHits)
            } else {
                match self.judge(sub_query, hits).await {
                    Ok(decision) => (decision, DecisionBasis::Judge),
                    Err(err) => {
                        ctx.logger.error(ctx.run_id, self.id(), &err);
                        judge_failures.push(err);
                        (JudgeDecision::Db, DecisionBasis::JudgeFailed)
                    }
                }
            };

            ctx.logger.decision(ctx.run_id, sub_query, decision, basis);
            decisions.push(SubQueryDecision {
                sub_query: sub_query.clone(),
                decision,
                basis,
            });
        }

        let relevance = aggregate(decisions, &state.internal_results, &sub_queries);
        let route = if relevance.needs_external() {
            ROUTE_EXTERNAL
        } else {
            ROUTE_SUFFICIENT
        };

        tracing::info!(
            is_sufficient = relevance.is_sufficient,
            score = relevance.score as f64,
            insufficient = relevance.insufficient_subqueries.len(),
            route,
            "relevance evaluated"
        );
        state.relevance = Some(relevance);

        let outcome = if judge_failures.is_empty() {
            StageOutcome::Ok
        } else {
            StageOutcome::degraded(format!(
                "judge failed for {} sub-quer{}, assumed sufficient: {}",
                judge_failures.len(),
                if judge_failures.len() == 1 { "y" } else { "ies" },
                judge_failures.join("; ")
            ))
        };
        Ok(NodeOutput::branch(route, outcome))
    }
}

/// Build the aggregate verdict from per-sub-query decisions.
pub fn aggregate(
    decisions: Vec<SubQueryDecision>,
    internal_results: &crate::rag::store::HitsByQuery,
    sub_queries: &[String],
) -> Relevance {
    let mut insufficient_subqueries: Vec<String> = Vec::new();
    for d in &decisions {
        if !d.decision.is_sufficient() && !insufficient_subqueries.contains(&d.sub_query) {
            insufficient_subqueries.push(d.sub_query.clone());
        }
    }

    let top_scores: Vec<f32> = sub_queries
        .iter()
        .filter_map(|q| internal_results.get(q).and_then(|hits| hits.first()))
        .map(|hit| hit.score)
        .collect();
    let score = if top_scores.is_empty() {
        0.0
    } else {
        top_scores.iter().sum::<f32>() / top_scores.len() as f32
    };

    Relevance {
        is_sufficient: insufficient_subqueries.is_empty(),
        score,
        insufficient_subqueries,
        decisions,
    }
}

/// Map judge text to a decision. Any "web" in the normalised reply means
/// insufficient; everything else, including empty or unexpected text, is
/// treated as sufficient.
pub fn parse_judge_decision(text: &str) -> JudgeDecision {
    if text.trim().to_lowercase().contains("web") {
        JudgeDecision::Web
    } else {
        JudgeDecision::Db
    }
}

fn judge_prompt(sub_query: &str, hits: &[Hit], config: &RelevanceConfig) -> String {
    let top_score = hits.first().map(|h| h.score).unwrap_or(0.0);
    let snippets: Vec<String> = hits
        .iter()
        .take(config.top_hits)
        .enumerate()
        .map(|(i, hit)| {
            let text = if hit.body.trim().is_empty() {
                &hit.title
            } else {
                &hit.body
            };
            format!("{}. {}", i + 1, truncate_chars(text, config.snippet_chars))
        })
        .collect();

    format!(
        concat!(
            "Decide whether the internal documents below are enough to answer the search query.\n",
            "Query: {}\n",
            "Top internal score: {:.4}\n",
            "Top internal documents:\n{}\n\n",
            "Reply with exactly one word: \"db\" if the documents are sufficient, ",
            "\"web\" if a web search is needed."
        ),
        sub_query,
        top_score,
        snippets.join("\n")
    )
}
