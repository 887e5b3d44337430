// Graph Builder
// Wires the retrieval pipeline from its stage nodes

use std::sync::Arc;

use super::node::GraphError;
use super::nodes::{
    AnswerVerificationNode, BuildContextNode, ExternalSearchNode, GenerationNode,
    InternalSearchNode, QueryAnalysisNode, RelevanceCheckNode, ROUTE_EXTERNAL, ROUTE_SUFFICIENT,
};
use super::runtime::{GraphBuilder, GraphRuntime};
use crate::core::config::PipelineConfig;
use crate::llm::{LlmProvider, LlmService};
use crate::rag::{ContextBuilder, InternalSearch};
use crate::tools::SearchProvider;

pub const ENTRY_NODE: &str = "query_analysis";

/// Build the pipeline graph:
///
/// query_analysis -> internal_search -> relevance_check
///   -[external]-> external_search -> build_context
///   -[sufficient]-> build_context
/// build_context -> generation [-> answer_verification]
pub fn build_pipeline_graph(
    config: &PipelineConfig,
    llm: Arc<dyn LlmProvider>,
    internal: Option<Arc<dyn InternalSearch>>,
    providers: Vec<Arc<dyn SearchProvider>>,
) -> Result<GraphRuntime, GraphError> {
    let llm = LlmService::new(llm, config.llm.clone(), config.timeouts.llm());

    let mut builder = GraphBuilder::new()
        .entry(ENTRY_NODE)
        .max_steps(8)
        .node(Box::new(QueryAnalysisNode::new(
            llm.clone(),
            config.analysis.clone(),
        )))
        .node(Box::new(InternalSearchNode::new(
            internal,
            config.internal_search.top_k,
            config.timeouts.internal_search(),
        )))
        .node(Box::new(RelevanceCheckNode::new(
            llm.clone(),
            config.relevance.clone(),
        )))
        .node(Box::new(ExternalSearchNode::new(
            providers,
            config.external_search.top_k,
            config.external_search.max_workers,
            config.timeouts.search(),
        )))
        .node(Box::new(BuildContextNode::new(ContextBuilder::new(
            config.context.clone(),
        ))))
        .node(Box::new(GenerationNode::new(
            llm.clone(),
            config.generation.clone(),
        )))
        .edge("query_analysis", "internal_search")
        .edge("internal_search", "relevance_check")
        .conditional_edge("relevance_check", "external_search", ROUTE_EXTERNAL)
        .conditional_edge("relevance_check", "build_context", ROUTE_SUFFICIENT)
        .edge("external_search", "build_context")
        .edge("build_context", "generation");

    if config.generation.verify_answer {
        builder = builder
            .node(Box::new(AnswerVerificationNode::new(
                llm,
                config.generation.clone(),
            )))
            .edge("generation", "answer_verification");
    }

    builder.build()
}
