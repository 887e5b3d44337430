//! Retrieval side of the pipeline.
//!
//! This module provides:
//! - `InternalSearch`: the internal knowledge-store capability
//! - `ElasticsearchStore`: hybrid BM25 + kNN backend fused with RRF
//! - `ContextBuilder`: merges internal and web evidence into grounding text
//! - `sources`: deduplicated, score-ordered citation lists

pub mod context_builder;
pub mod elasticsearch;
pub mod sources;
pub mod store;

pub use context_builder::{BuiltContext, ContextBuilder, NO_RESULTS_CONTEXT};
pub use elasticsearch::ElasticsearchStore;
pub use sources::Source;
pub use store::{HitsByQuery, InternalSearch};
