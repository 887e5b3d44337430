// Build Context Node
// Merges web and internal evidence into the grounding context

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
use crate::graph::state::PipelineState;
use crate::rag::context_builder::ContextBuilder;

pub struct BuildContextNode {
    builder: ContextBuilder,
}

impl BuildContextNode {
    pub fn new(builder: ContextBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Node for BuildContextNode {
    fn id(&self) -> &'static str {
        "build_context"
    }

    fn name(&self) -> &'static str {
        "Build Context"
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let sub_queries = state.sub_queries();
        let built = self
            .builder
            .build(&sub_queries, &state.internal_results, &state.external_results);

        let outcome = if built.has_external || built.has_internal {
            StageOutcome::Ok
        } else {
            StageOutcome::degraded("no evidence from any source")
        };

        tracing::debug!(
            sources = built.sources.len(),
            context_chars = built.context.chars().count(),
            "context built"
        );

        state.context = built.context;
        state.sources = built.sources;
        state.has_external = built.has_external;
        state.has_internal = built.has_internal;
        Ok(NodeOutput::next(outcome))
    }
}
