//! Integrated retrieval-augmented answering pipeline.
//!
//! A query is analysed into sub-queries, searched against an internal store,
//! judged for sufficiency, topped up from web providers when needed, merged
//! into a grounded context and answered by a language model. Results are
//! cached per `(query, chat_history)`.

pub mod cache;
pub mod core;
pub mod graph;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod rag;
pub mod tools;

pub use pipeline::{Collaborators, QueryResponse, RagPipeline};
