// Graph State
// PipelineState and the records each stage writes into it

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;
use crate::rag::sources::Source;
use crate::rag::store::HitsByQuery;
use crate::tools::search::ExternalResults;

pub const DEFAULT_INTENT: &str = "search";
pub const STRATEGY_INTERNAL_AND_EXTERNAL: &str = "internal_and_external";

/// Output of the query analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: String,
    pub search_strategy: String,
    pub sub_queries: Vec<String>,
    pub needs_web_search: bool,
}

impl QueryAnalysis {
    /// Single-query analysis used whenever the model output is unusable.
    pub fn fallback(user_query: &str) -> Self {
        Self {
            intent: DEFAULT_INTENT.to_string(),
            search_strategy: STRATEGY_INTERNAL_AND_EXTERNAL.to_string(),
            sub_queries: vec![user_query.trim().to_string()],
            needs_web_search: false,
        }
    }

    /// Force web search regardless of what the model said.
    pub fn apply_recency_override(&mut self) {
        self.search_strategy = STRATEGY_INTERNAL_AND_EXTERNAL.to_string();
        self.needs_web_search = true;
    }
}

/// Per-sub-query verdict of the relevance judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeDecision {
    /// Internal evidence is insufficient; search the web.
    Web,
    /// Internal evidence is sufficient.
    Db,
}

impl JudgeDecision {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, JudgeDecision::Db)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeDecision::Web => "web",
            JudgeDecision::Db => "db",
        }
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    RecencyOverride,
    NoInternalHits,
    Judge,
    JudgeFailed,
}

impl DecisionBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionBasis::RecencyOverride => "recency_override",
            DecisionBasis::NoInternalHits => "no_internal_hits",
            DecisionBasis::Judge => "judge",
            DecisionBasis::JudgeFailed => "judge_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQueryDecision {
    pub sub_query: String,
    pub decision: JudgeDecision,
    pub basis: DecisionBasis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
    pub is_sufficient: bool,
    /// Mean of the top internal score over sub-queries that have hits.
    pub score: f32,
    /// Insufficient sub-queries in evaluation order, without duplicates.
    pub insufficient_subqueries: Vec<String>,
    pub decisions: Vec<SubQueryDecision>,
}

impl Relevance {
    pub fn needs_external(&self) -> bool {
        !self.is_sufficient || !self.insufficient_subqueries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub is_accurate: bool,
    pub is_consistent: bool,
    pub is_complete: bool,
    pub is_relevant: bool,
    pub overall_score: f32,
    pub issues: Vec<String>,
}

impl Verification {
    /// Neutral verdict recorded when grading itself fails.
    pub fn neutral(issue: impl Into<String>) -> Self {
        Self {
            is_accurate: true,
            is_consistent: true,
            is_complete: true,
            is_relevant: true,
            overall_score: 0.5,
            issues: vec![issue.into()],
        }
    }
}

/// Record threaded through every stage of one pipeline run. Owned by that
/// run only; a copy of the final state is what the cache stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub user_query: String,
    pub chat_history: Vec<ChatMessage>,
    /// Set by query analysis when a recency keyword appears in the query.
    pub recency_hint: bool,
    pub query_analysis: Option<QueryAnalysis>,
    pub internal_results: HitsByQuery,
    pub relevance: Option<Relevance>,
    pub external_results: ExternalResults,
    pub context: String,
    pub sources: Vec<Source>,
    pub has_external: bool,
    pub has_internal: bool,
    pub answer: String,
    pub verification: Option<Verification>,
}

impl PipelineState {
    pub fn new(user_query: impl Into<String>, chat_history: Vec<ChatMessage>) -> Self {
        Self {
            user_query: user_query.into(),
            chat_history,
            ..Default::default()
        }
    }

    /// Sub-queries written by query analysis, or the raw query if analysis
    /// has not run.
    pub fn sub_queries(&self) -> Vec<String> {
        match &self.query_analysis {
            Some(analysis) if !analysis.sub_queries.is_empty() => analysis.sub_queries.clone(),
            _ => vec![self.user_query.trim().to_string()],
        }
    }

    pub fn internal_hit_count(&self) -> usize {
        self.internal_results.values().map(|hits| hits.len()).sum()
    }

    pub fn external_hit_count(&self) -> usize {
        self.external_results
            .values()
            .map(|outcome| outcome.hits().len())
            .sum()
    }

    pub fn is_relevant_enough(&self) -> bool {
        self.relevance
            .as_ref()
            .map(|r| r.is_sufficient)
            .unwrap_or(false)
    }

    pub fn relevance_score(&self) -> f32 {
        self.relevance.as_ref().map(|r| r.score).unwrap_or(0.0)
    }
}
