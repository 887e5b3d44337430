//! Context Builder.
//!
//! Merges external and internal evidence into the grounding text handed to
//! the generator:
//! 1. External (web) blocks, grouped by sub-query
//! 2. Internal knowledge-base blocks, grouped by sub-query
//! 3. A numbered source appendix built from the deduplicated source list

use std::fmt::Write as _;

use super::sources::{collect_sources, Source};
use super::store::HitsByQuery;
use crate::core::config::settings::ContextConfig;
use crate::tools::search::{ExternalResults, Hit};

/// Context used when neither store produced evidence.
pub const NO_RESULTS_CONTEXT: &str = "검색 결과가 없습니다.";

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    pub context: String,
    pub sources: Vec<Source>,
    pub has_external: bool,
    pub has_internal: bool,
}

pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        sub_queries: &[String],
        internal: &HitsByQuery,
        external: &ExternalResults,
    ) -> BuiltContext {
        let external_block = format_block(
            "Web search results",
            sub_queries
                .iter()
                .filter_map(|q| external.get(q).map(|o| (q, o.hits()))),
        );
        let internal_block = format_block(
            "Internal knowledge base",
            sub_queries
                .iter()
                .filter_map(|q| internal.get(q).map(|hits| (q, hits.as_slice()))),
        );

        let has_external = external_block.is_some();
        let has_internal = internal_block.is_some();

        let mut parts: Vec<String> = Vec::new();
        parts.extend(external_block);
        parts.extend(internal_block);

        let sources = collect_sources(sub_queries, internal, external, &self.config);

        let mut context = if parts.is_empty() {
            NO_RESULTS_CONTEXT.to_string()
        } else {
            parts.join("\n\n")
        };
        if !sources.is_empty() {
            context.push_str(&format_sources_for_context(&sources));
        }

        BuiltContext {
            context,
            sources,
            has_external,
            has_internal,
        }
    }
}

fn format_block<'a, I>(label: &str, groups: I) -> Option<String>
where
    I: Iterator<Item = (&'a String, &'a [Hit])>,
{
    let mut block = String::new();
    for (query, hits) in groups {
        if hits.is_empty() {
            continue;
        }
        let _ = writeln!(block, "### {}", query);
        for (i, hit) in hits.iter().enumerate() {
            let _ = write!(
                block,
                "[{}] {} ({}, score: {:.4}",
                i + 1,
                hit.title,
                hit.provider,
                hit.score
            );
            if let Some(date) = hit.date.as_deref().filter(|d| !d.is_empty()) {
                let _ = write!(block, ", {}", date);
            }
            block.push_str(")\n");
            if !hit.body.trim().is_empty() {
                let _ = writeln!(block, "{}", hit.body.trim());
            }
            if !hit.url.is_empty() {
                let _ = writeln!(block, "URL: {}", hit.url);
            }
        }
        block.push('\n');
    }

    if block.is_empty() {
        return None;
    }
    Some(format!("=== {} ===\n{}", label, block.trim_end()))
}

fn format_sources_for_context(sources: &[Source]) -> String {
    let mut out = String::from("\n\n=== Sources ===\n");
    for (i, source) in sources.iter().enumerate() {
        let _ = write!(out, "[{}] {}", i + 1, source.title);
        if !source.url.is_empty() {
            let _ = write!(out, " - {}", source.url);
        }
        if let Some(date) = source.date.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " ({})", date);
        }
        let _ = writeln!(out, " [{}]", source.provider);
        if !source.snippet.is_empty() {
            let _ = writeln!(out, "    {}", source.snippet);
        }
    }
    out
}
