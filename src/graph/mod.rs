// Pipeline Graph Module
// Stage nodes wired as a small data-driven state machine

pub mod builder;
pub mod node;
pub mod runtime;
pub mod state;

pub mod nodes;

pub use builder::build_pipeline_graph;
pub use node::{GraphError, Node, NodeContext, NodeOutput, StageOutcome};
pub use runtime::{ExecutionReport, GraphRuntime};
pub use state::{JudgeDecision, PipelineState, QueryAnalysis, Relevance, Verification};
