// Node trait and types
// Base abstraction for pipeline stages

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::PipelineError;
use crate::pipeline::logger::PipelineLogger;

use super::state::PipelineState;

/// Context passed to nodes during execution
pub struct NodeContext<'a> {
    /// Structured telemetry sink for this run
    pub logger: &'a dyn PipelineLogger,
    /// Identifier shared by every log record of this run
    pub run_id: &'a str,
}

/// How a stage fared. Stages never raise for collaborator failures; they
/// report them here and let the run continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    /// Finished with reduced evidence or a fallback value.
    Degraded(String),
    /// The stage's own work failed; state carries a safe substitute.
    Failed(String),
}

impl StageOutcome {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Ok => "ok",
            StageOutcome::Degraded(_) => "degraded",
            StageOutcome::Failed(_) => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            StageOutcome::Ok => None,
            StageOutcome::Degraded(reason) | StageOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Where to go after a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Follow the default edge; a node without one ends the run
    Next,
    /// Follow the edge registered for this condition
    Branch(String),
    /// Stop here
    End,
}

/// Output from a node execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub route: Route,
    pub outcome: StageOutcome,
}

impl NodeOutput {
    pub fn next(outcome: StageOutcome) -> Self {
        Self {
            route: Route::Next,
            outcome,
        }
    }

    pub fn branch(condition: impl Into<String>, outcome: StageOutcome) -> Self {
        Self {
            route: Route::Branch(condition.into()),
            outcome,
        }
    }

    pub fn end(outcome: StageOutcome) -> Self {
        Self {
            route: Route::End,
            outcome,
        }
    }
}

/// Graph execution error
///
/// Includes an `execution_trace` recording the node IDs visited before the
/// error occurred.
#[derive(Debug, Clone)]
pub struct GraphError {
    pub node_id: String,
    pub message: String,
    /// Ordered list of node IDs executed before this error, most-recent last.
    pub execution_trace: Vec<String>,
}

impl GraphError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            execution_trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.execution_trace = trace;
        self
    }
}

impl From<GraphError> for PipelineError {
    fn from(err: GraphError) -> Self {
        PipelineError::internal(err)
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execution_trace.is_empty() {
            write!(f, "GraphError in {}: {}", self.node_id, self.message)
        } else {
            write!(
                f,
                "GraphError in {} (trace: {}): {}",
                self.node_id,
                self.execution_trace.join(" -> "),
                self.message
            )
        }
    }
}

impl std::error::Error for GraphError {}

/// Node trait - every pipeline stage implements this. Collaborators are
/// handed to the node's constructor.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique identifier for this node
    fn id(&self) -> &'static str;

    /// Human-readable name for display
    fn name(&self) -> &'static str {
        self.id()
    }

    /// Execute the node logic
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError>;
}
