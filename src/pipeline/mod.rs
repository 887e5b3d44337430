//! Orchestration surface: `RagPipeline::run_query` and the telemetry seam.

pub mod logger;
pub mod runner;

pub use logger::{NoopLogger, PipelineLogger, RunStats, TracingLogger};
pub use runner::{Collaborators, Method, QueryResponse, RagPipeline, SourceCounts};
