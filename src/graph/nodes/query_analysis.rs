// Query Analysis Node
// Decomposes the user query into sub-queries and a search strategy

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::core::config::settings::AnalysisConfig;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::{
    PipelineState, QueryAnalysis, DEFAULT_INTENT, STRATEGY_INTERNAL_AND_EXTERNAL,
};
use crate::llm::{ChatRequest, LlmService};

pub struct QueryAnalysisNode {
    llm: LlmService,
    config: AnalysisConfig,
}

impl QueryAnalysisNode {
    pub fn new(llm: LlmService, config: AnalysisConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl Node for QueryAnalysisNode {
    fn id(&self) -> &'static str {
        "query_analysis"
    }

    fn name(&self) -> &'static str {
        "Query Analysis"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let query = state.user_query.trim().to_string();
        let recency_keyword = detect_recency(&query, &self.config.recency_keywords);
        state.recency_hint = recency_keyword.is_some();
        if let Some(keyword) = &recency_keyword {
            tracing::info!(keyword = %keyword, "recency keyword found; web search will be forced");
        }

        let prompt = analysis_prompt(&query, state.recency_hint);
        let (mut analysis, outcome) = match self
            .llm
            .chat("query analysis", ChatRequest::prompt(prompt).json())
            .await
        {
            Ok(response) => match parse_query_analysis(&response, &query, self.config.max_sub_queries)
            {
                Ok((analysis, missing)) if missing.is_empty() => (analysis, StageOutcome::Ok),
                Ok((analysis, missing)) => (
                    analysis,
                    StageOutcome::degraded(format!(
                        "analysis missing keys: {}",
                        missing.join(", ")
                    )),
                ),
                Err(reason) => (
                    QueryAnalysis::fallback(&query),
                    StageOutcome::degraded(format!("unparseable analysis: {}", reason)),
                ),
            },
            Err(err) => (
                QueryAnalysis::fallback(&query),
                StageOutcome::degraded(format!("analysis call failed: {}", err)),
            ),
        };

        if state.recency_hint {
            analysis.apply_recency_override();
        }

        tracing::debug!(
            intent = %analysis.intent,
            strategy = %analysis.search_strategy,
            sub_queries = ?analysis.sub_queries,
            "query analysed"
        );
        state.query_analysis = Some(analysis);
        Ok(NodeOutput::next(outcome))
    }
}

fn analysis_prompt(query: &str, needs_recent_info: bool) -> String {
    let recency_note = if needs_recent_info {
        "The question asks about recent events, so web search will be used.\n"
    } else {
        ""
    };
    format!(
        concat!(
            "You plan searches for a question-answering system backed by an internal news archive ",
            "and web search.\n",
            "{}",
            "Analyse the question and reply with ONLY a JSON object with these keys:\n",
            "  \"intent\": short label of what the user wants,\n",
            "  \"search_strategy\": \"internal_only\" or \"internal_and_external\",\n",
            "  \"sub_queries\": 1-5 focused search queries in the question's language,\n",
            "  \"needs_web_search\": true if fresh information from the web is required.\n\n",
            "Question: {}"
        ),
        recency_note, query
    )
}

/// First configured keyword present in the query. Keywords made only of ASCII
/// must match on word boundaries ("now" does not fire on "know"); others match
/// as substrings, which suits languages written without spaces between
/// particles.
pub fn detect_recency(query: &str, keywords: &[String]) -> Option<String> {
    let lowered = query.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .find(|keyword| {
            if keyword.is_ascii() {
                contains_word(&lowered, keyword)
            } else {
                lowered.contains(keyword.as_str())
            }
        })
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

/// Parse the model's analysis. Accepts a bare JSON object, one inside a
/// ```` ```json ```` fence, or one embedded in surrounding text. Missing keys
/// are filled with defaults and reported in the second tuple element.
pub fn parse_query_analysis(
    text: &str,
    user_query: &str,
    max_sub_queries: usize,
) -> Result<(QueryAnalysis, Vec<&'static str>), String> {
    let object = extract_json_object(text).ok_or_else(|| "no JSON object found".to_string())?;
    let mut missing = Vec::new();

    let intent = match object.get("intent").and_then(|v| v.as_str()) {
        Some(intent) if !intent.trim().is_empty() => intent.trim().to_string(),
        _ => {
            missing.push("intent");
            DEFAULT_INTENT.to_string()
        }
    };

    let search_strategy = match object.get("search_strategy").and_then(|v| v.as_str()) {
        Some(strategy) if !strategy.trim().is_empty() => strategy.trim().to_string(),
        _ => {
            missing.push("search_strategy");
            STRATEGY_INTERNAL_AND_EXTERNAL.to_string()
        }
    };

    let mut sub_queries: Vec<String> = Vec::new();
    if let Some(items) = object.get("sub_queries").and_then(|v| v.as_array()) {
        for item in items {
            let Some(text) = item.as_str() else { continue };
            let text = text.trim();
            if text.is_empty() || sub_queries.iter().any(|q| q == text) {
                continue;
            }
            sub_queries.push(text.to_string());
        }
    }
    if sub_queries.is_empty() {
        missing.push("sub_queries");
        sub_queries.push(user_query.trim().to_string());
    }
    sub_queries.truncate(max_sub_queries.max(1));

    let needs_web_search = object
        .get("needs_web_search")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok((
        QueryAnalysis {
            intent,
            search_strategy,
            sub_queries,
            needs_web_search,
        },
        missing,
    ))
}

static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fence pattern"));

pub(crate) fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = text.trim();

    // Fenced block
    if let Some(inner) = FENCED_JSON_RE.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(inner.as_str()) {
            return Some(map);
        }
    }

    // Direct parse
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    // Outermost braces
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
