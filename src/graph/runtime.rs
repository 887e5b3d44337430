// Graph Runtime
// Data-driven state machine: a node table plus an edge table keyed by node id

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::node::{GraphError, Node, NodeContext, Route, StageOutcome};
use super::state::PipelineState;

/// Edge condition for graph routing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeCondition {
    /// Always follow this edge (default edge)
    Always,
    /// Follow this edge when the node returns this condition
    OnCondition(String),
}

impl EdgeCondition {
    pub fn always() -> Self {
        Self::Always
    }

    pub fn on(condition: impl Into<String>) -> Self {
        Self::OnCondition(condition.into())
    }

    pub fn matches(&self, condition: Option<&str>) -> bool {
        match (self, condition) {
            (EdgeCondition::Always, None) => true,
            (EdgeCondition::OnCondition(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// One executed stage.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub node_id: &'static str,
    pub outcome: StageOutcome,
    pub elapsed: Duration,
}

/// Ordered record of every stage a run executed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub stages: Vec<StageRecord>,
}

impl ExecutionReport {
    pub fn trace(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.node_id.to_string()).collect()
    }

    pub fn visited(&self, node_id: &str) -> bool {
        self.stages.iter().any(|s| s.node_id == node_id)
    }
}

pub struct GraphRuntime {
    nodes: HashMap<&'static str, Box<dyn Node>>,
    edges: HashMap<String, Vec<(EdgeCondition, String)>>,
    /// Insertion order, for introspection
    order: Vec<&'static str>,
    entry_node_id: String,
    /// Maximum execution steps
    max_steps: usize,
}

impl GraphRuntime {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            order: Vec::new(),
            entry_node_id: String::new(),
            max_steps: 16,
        }
    }

    pub fn add_node(&mut self, node: Box<dyn Node>) {
        let id = node.id();
        if self.nodes.insert(id, node).is_none() {
            self.order.push(id);
        }
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        self.add_conditional_edge(from, to, EdgeCondition::Always)
    }

    pub fn add_conditional_edge(
        &mut self,
        from: &str,
        to: &str,
        condition: EdgeCondition,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::new(from, format!("Source node not found: {}", from)));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::new(to, format!("Target node not found: {}", to)));
        }
        self.edges
            .entry(from.to_string())
            .or_default()
            .push((condition, to.to_string()));
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> Option<&dyn Node> {
        self.nodes.get(node_id).map(|boxed| boxed.as_ref())
    }

    pub fn node_ids(&self) -> &[&'static str] {
        &self.order
    }

    /// Execute the graph from the entry node. Every node runs at most once;
    /// revisiting a node is reported as a wiring error.
    pub async fn run(
        &self,
        state: &mut PipelineState,
        ctx: &NodeContext<'_>,
    ) -> Result<ExecutionReport, GraphError> {
        if self.entry_node_id.is_empty() {
            return Err(GraphError::new("runtime", "No entry node set"));
        }

        let mut report = ExecutionReport::default();
        let mut visited: HashSet<&'static str> = HashSet::new();
        let mut current = self.entry_node_id.clone();

        loop {
            if report.stages.len() >= self.max_steps {
                return Err(GraphError::new(
                    "runtime",
                    format!("Maximum steps ({}) exceeded", self.max_steps),
                )
                .with_trace(report.trace()));
            }

            let node = self.nodes.get(current.as_str()).ok_or_else(|| {
                GraphError::new("runtime", format!("Node not found: {}", current))
                    .with_trace(report.trace())
            })?;

            let node_id = node.id();
            if !visited.insert(node_id) {
                return Err(GraphError::new(node_id, "Node re-entered")
                    .with_trace(report.trace()));
            }

            tracing::debug!("Executing node: {} (step {})", node_id, report.stages.len());
            let started = Instant::now();
            let output = node
                .execute(state, ctx)
                .await
                .map_err(|e| e.with_trace(report.trace()))?;
            let elapsed = started.elapsed();

            ctx.logger
                .stage(ctx.run_id, node_id, &output.outcome, elapsed);
            report.stages.push(StageRecord {
                node_id,
                outcome: output.outcome,
                elapsed,
            });

            let next = match output.route {
                Route::End => None,
                Route::Next => self.resolve_next_node(node_id, None)?,
                Route::Branch(condition) => {
                    let next = self.resolve_next_node(node_id, Some(&condition))?;
                    if next.is_none() {
                        return Err(GraphError::new(
                            node_id,
                            format!("No matching edge for condition: {}", condition),
                        )
                        .with_trace(report.trace()));
                    }
                    next
                }
            };

            match next {
                Some(next_id) => current = next_id,
                None => {
                    tracing::debug!("Graph execution complete at node: {}", node_id);
                    return Ok(report);
                }
            }
        }
    }

    /// Conditional edges are matched first, then the default edge. `None`
    /// means the node has no applicable outgoing edge.
    fn resolve_next_node(
        &self,
        current_id: &str,
        condition: Option<&str>,
    ) -> Result<Option<String>, GraphError> {
        let Some(edges) = self.edges.get(current_id) else {
            return Ok(None);
        };

        if let Some((_, target)) = edges.iter().find(|(edge, _)| edge.matches(condition)) {
            return Ok(Some(target.clone()));
        }

        if let Some((_, target)) = edges
            .iter()
            .find(|(edge, _)| *edge == EdgeCondition::Always)
        {
            if let Some(cond) = condition {
                tracing::warn!(
                    "Condition '{}' not matched for node '{}', using default edge",
                    cond,
                    current_id
                );
            }
            return Ok(Some(target.clone()));
        }

        Ok(None)
    }
}

impl Default for GraphRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing graphs fluently
pub struct GraphBuilder {
    runtime: GraphRuntime,
    pending_edges: Vec<(String, String, EdgeCondition)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            runtime: GraphRuntime::new(),
            pending_edges: Vec::new(),
        }
    }

    pub fn entry(mut self, node_id: impl Into<String>) -> Self {
        self.runtime.entry_node_id = node_id.into();
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.runtime.max_steps = max_steps;
        self
    }

    pub fn node(mut self, node: Box<dyn Node>) -> Self {
        self.runtime.add_node(node);
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::Always));
        self
    }

    pub fn conditional_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.pending_edges
            .push((from.into(), to.into(), EdgeCondition::on(condition)));
        self
    }

    pub fn build(mut self) -> Result<GraphRuntime, GraphError> {
        if !self.runtime.nodes.contains_key(self.runtime.entry_node_id.as_str()) {
            return Err(GraphError::new(
                "runtime",
                format!("Entry node not found: {}", self.runtime.entry_node_id),
            ));
        }
        for (from, to, condition) in self.pending_edges {
            self.runtime.add_conditional_edge(&from, &to, condition)?;
        }
        Ok(self.runtime)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeOutput;
    use crate::pipeline::logger::NoopLogger;
    use async_trait::async_trait;

    struct Step {
        id: &'static str,
        route: Route,
    }

    #[async_trait]
    impl Node for Step {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn execute(
            &self,
            state: &mut PipelineState,
            _ctx: &NodeContext<'_>,
        ) -> Result<NodeOutput, GraphError> {
            state.answer.push_str(self.id);
            state.answer.push(' ');
            Ok(NodeOutput {
                route: self.route.clone(),
                outcome: StageOutcome::Ok,
            })
        }
    }

    fn step(id: &'static str, route: Route) -> Box<dyn Node> {
        Box::new(Step { id, route })
    }

    #[test]
    fn test_edge_condition_matching() {
        assert!(EdgeCondition::Always.matches(None));
        assert!(!EdgeCondition::Always.matches(Some("external")));

        assert!(EdgeCondition::on("external").matches(Some("external")));
        assert!(!EdgeCondition::on("external").matches(Some("sufficient")));
        assert!(!EdgeCondition::on("external").matches(None));
    }

    #[tokio::test]
    async fn branch_selects_conditional_edge_and_terminal_node_ends_run() {
        let graph = GraphBuilder::new()
            .entry("a")
            .node(step("a", Route::Branch("skip".to_string())))
            .node(step("b", Route::Next))
            .node(step("c", Route::Next))
            .conditional_edge("a", "b", "detour")
            .conditional_edge("a", "c", "skip")
            .edge("b", "c")
            .build()
            .unwrap();

        let mut state = PipelineState::default();
        let logger = NoopLogger;
        let ctx = NodeContext {
            logger: &logger,
            run_id: "t",
        };
        let report = graph.run(&mut state, &ctx).await.unwrap();

        assert_eq!(state.answer, "a c ");
        assert_eq!(report.trace(), vec!["a", "c"]);
        assert!(!report.visited("b"));
    }

    #[tokio::test]
    async fn revisiting_a_node_is_an_error() {
        let graph = GraphBuilder::new()
            .entry("a")
            .node(step("a", Route::Next))
            .node(step("b", Route::Next))
            .edge("a", "b")
            .edge("b", "a")
            .build()
            .unwrap();

        let mut state = PipelineState::default();
        let logger = NoopLogger;
        let ctx = NodeContext {
            logger: &logger,
            run_id: "t",
        };
        let err = graph.run(&mut state, &ctx).await.unwrap_err();
        assert_eq!(err.node_id, "a");
        assert_eq!(err.execution_trace, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unmatched_branch_without_default_is_an_error() {
        let graph = GraphBuilder::new()
            .entry("a")
            .node(step("a", Route::Branch("nowhere".to_string())))
            .node(step("b", Route::Next))
            .conditional_edge("a", "b", "somewhere")
            .build()
            .unwrap();

        let mut state = PipelineState::default();
        let logger = NoopLogger;
        let ctx = NodeContext {
            logger: &logger,
            run_id: "t",
        };
        assert!(graph.run(&mut state, &ctx).await.is_err());
    }

    #[test]
    fn build_rejects_unknown_nodes() {
        assert!(GraphBuilder::new()
            .entry("missing")
            .node(step("a", Route::End))
            .build()
            .is_err());
        assert!(GraphBuilder::new()
            .entry("a")
            .node(step("a", Route::End))
            .edge("a", "ghost")
            .build()
            .is_err());
    }
}
