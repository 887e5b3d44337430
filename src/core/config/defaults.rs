//! Built-in default values that are lists rather than scalars.

use crate::tools::search::Provider;

/// Temporal keywords that force external search. Matched case-insensitively
/// against the raw query.
pub fn default_recency_keywords() -> Vec<String> {
    [
        "오늘",
        "최신",
        "최근",
        "현재",
        "지금",
        "요즘",
        "이번",
        "today",
        "latest",
        "recent",
        "now",
        "current",
        "this week",
        "breaking",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Substrings that indicate the model already wrote its own citation block.
pub fn default_citation_markers() -> Vec<String> {
    ["참고 자료", "출처", "Sources:", "References:"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// External providers in fallback priority order.
pub fn default_providers() -> Vec<Provider> {
    vec![Provider::Naver, Provider::DuckDuckGo]
}
