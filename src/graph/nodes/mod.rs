// Graph Nodes Module
// One node per pipeline stage

pub mod answer_verification;
pub mod build_context;
pub mod external_search;
pub mod generation;
pub mod internal_search;
pub mod query_analysis;
pub mod relevance_check;

pub use answer_verification::AnswerVerificationNode;
pub use build_context::BuildContextNode;
pub use external_search::ExternalSearchNode;
pub use generation::GenerationNode;
pub use internal_search::InternalSearchNode;
pub use query_analysis::QueryAnalysisNode;
pub use relevance_check::{RelevanceCheckNode, ROUTE_EXTERNAL, ROUTE_SUFFICIENT};
