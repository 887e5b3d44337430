//! Source extraction: turns internal and external hits into a deduplicated,
//! score-ordered citation list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::store::HitsByQuery;
use crate::core::config::settings::ContextConfig;
use crate::tools::search::{ExternalResults, Hit, Provider};

pub const SOURCES_HEADER: &str = "참고 자료";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub date: Option<String>,
    pub provider: Provider,
    pub score: f32,
}

impl Source {
    fn from_hit(hit: &Hit, score: f32, snippet_chars: usize) -> Self {
        Self {
            title: hit.title.clone(),
            url: hit.url.clone(),
            snippet: truncate_chars(&hit.body, snippet_chars),
            date: hit.date.clone(),
            provider: hit.provider,
            score,
        }
    }

    /// URL when present, otherwise the case-folded, whitespace-collapsed title.
    pub fn identity_key(&self) -> String {
        let url = self.url.trim();
        if !url.is_empty() {
            return url.to_string();
        }
        self.title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Build the source list. External hits are visited first so that on equal
/// scores they keep their place ahead of internal ones after the stable sort.
pub fn collect_sources(
    sub_queries: &[String],
    internal: &HitsByQuery,
    external: &ExternalResults,
    config: &ContextConfig,
) -> Vec<Source> {
    let mut candidates = Vec::new();

    for query in sub_queries {
        if let Some(outcome) = external.get(query) {
            for hit in outcome.hits() {
                candidates.push(Source::from_hit(
                    hit,
                    config.external_source_score,
                    config.snippet_chars,
                ));
            }
        }
    }

    for query in sub_queries {
        if let Some(hits) = internal.get(query) {
            for hit in hits.iter().take(config.internal_hits_per_query) {
                candidates.push(Source::from_hit(hit, hit.score, config.snippet_chars));
            }
        }
    }

    let mut sources = dedup_sources(candidates);
    sources.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sources.truncate(config.max_sources);
    sources
}

/// Keep one source per identity key, preferring the higher score. The first
/// occurrence's position is retained.
pub fn dedup_sources(candidates: Vec<Source>) -> Vec<Source> {
    let mut deduped: Vec<Source> = Vec::with_capacity(candidates.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for source in candidates {
        let key = source.identity_key();
        if key.is_empty() {
            continue;
        }
        match seen.get(&key) {
            Some(&pos) => {
                if source.score > deduped[pos].score {
                    deduped[pos] = source;
                }
            }
            None => {
                seen.insert(key, deduped.len());
                deduped.push(source);
            }
        }
    }
    deduped
}

/// Numbered list appended to answers that carry no citations of their own.
pub fn format_sources_for_answer(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut out = format!("\n\n---\n**{}**\n", SOURCES_HEADER);
    for (i, source) in sources.iter().enumerate() {
        let title = if source.title.is_empty() {
            "(untitled)"
        } else {
            source.title.as_str()
        };
        if source.url.is_empty() {
            out.push_str(&format!("{}. {}", i + 1, title));
        } else {
            out.push_str(&format!("{}. [{}]({})", i + 1, title, source.url));
        }
        if let Some(date) = source.date.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!(" ({})", date));
        }
        out.push('\n');
    }
    out
}

/// Truncate on a char boundary, appending `...` when something was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
