//! Turns a workflow's `flow` list into a dependency graph and orders it.

use crate::registry::NodeRegistry;
use gilcore::{Connection, FlowStep, WorkflowConfig, WorkflowError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Connection graph over the declared nodes of one workflow.
///
/// Node indices follow declaration order, edges carry the [`Connection`]
/// they were built from.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    graph: DiGraph<String, Connection>,
    index: HashMap<String, NodeIndex>,
    node_types: HashMap<String, String>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>, node_type: impl Into<String>) {
        let id = id.into();
        if !self.index.contains_key(&id) {
            let idx = self.graph.add_node(id.clone());
            self.index.insert(id.clone(), idx);
        }
        self.node_types.insert(id, node_type.into());
    }

    /// Add an explicit edge between two declared nodes.
    pub fn connect(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> Result<&Connection, WorkflowError> {
        let connection = Connection::new(source, source_port, target, target_port);
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            let missing = if self.contains(source) { target } else { source };
            return Err(WorkflowError::InvalidConnection(format!(
                "{connection}: node '{missing}' is not declared"
            )));
        };
        let edge = self.graph.add_edge(from, to, connection);
        Ok(&self.graph[edge])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    pub fn node_type(&self, id: &str) -> Option<&str> {
        self.node_types.get(id).map(String::as_str)
    }

    /// Connections in the order they were added.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.graph.edge_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Ids of the direct predecessors of `id`.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        deps.sort();
        deps.dedup();
        deps.into_iter().map(|d| self.graph[d].as_str()).collect()
    }

    fn is_isolated(&self, idx: NodeIndex) -> bool {
        self.graph.edges_directed(idx, Direction::Incoming).next().is_none()
            && self.graph.edges_directed(idx, Direction::Outgoing).next().is_none()
    }

    /// Depth-first search with a recursion stack. Returns the first cycle
    /// found as the node ids along it, closed by repeating the entry node.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for start in self.graph.node_indices() {
            if !visited.contains(&start) {
                if let Some(cycle) = self.dfs(start, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        stack.push(node);

        for next in self.sorted_edges(node) {
            if let Some(pos) = stack.iter().position(|&n| n == next) {
                let mut cycle: Vec<String> =
                    stack[pos..].iter().map(|&n| self.graph[n].clone()).collect();
                cycle.push(self.graph[next].clone());
                return Some(cycle);
            }
            if !visited.contains(&next) {
                if let Some(cycle) = self.dfs(next, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }

    /// Outgoing targets of `node` in the order their edges were added.
    fn sorted_edges(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self.graph.edges_directed(node, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| e.target()).collect()
    }

    /// Topological order by Kahn's algorithm. Connected nodes come first,
    /// seeded in declaration order; isolated nodes follow in declaration
    /// order. A cycle is a fatal error.
    pub fn execution_order(&self) -> Result<Vec<String>, WorkflowError> {
        if let Some(cycle) = self.find_cycle() {
            return Err(WorkflowError::CyclicDependency(cycle));
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();

        let (isolated, connected): (Vec<NodeIndex>, Vec<NodeIndex>) =
            self.graph.node_indices().partition(|&idx| self.is_isolated(idx));

        let mut queue: VecDeque<NodeIndex> =
            connected.iter().copied().filter(|idx| in_degree[idx] == 0).collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in self.sorted_edges(node) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if order.len() != connected.len() {
            let placed: HashSet<NodeIndex> = order.iter().copied().collect();
            let stuck: Vec<String> = connected
                .iter()
                .filter(|idx| !placed.contains(idx))
                .map(|&idx| self.graph[idx].clone())
                .collect();
            return Err(WorkflowError::CyclicDependency(stuck));
        }

        order.extend(isolated);
        Ok(order.into_iter().map(|idx| self.graph[idx].clone()).collect())
    }

    /// Mermaid `graph TD` rendering.
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph TD".to_string()];
        for id in self.node_ids() {
            let node_type = self.node_type(id).unwrap_or("unknown");
            lines.push(format!("    {id}[{id}<br/>{node_type}]"));
        }
        for conn in self.connections() {
            lines.push(format!("    {} --> {}", conn.source_node, conn.target_node));
        }
        lines.join("\n")
    }
}

/// Outcome of [`GraphBuilder::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Builds a [`WorkflowGraph`] from a [`WorkflowConfig`].
pub struct GraphBuilder<'a> {
    config: &'a WorkflowConfig,
}

struct Inferred {
    edges: Vec<(String, String)>,
    dangling: Vec<String>,
    mentioned: HashSet<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a WorkflowConfig) -> Self {
        Self { config }
    }

    /// Walk the flow steps keeping a frontier of the most recent nodes.
    fn infer(&self) -> Inferred {
        let mut frontier: Vec<String> = Vec::new();
        let mut edges = Vec::new();
        let mut mentioned = HashSet::new();

        for step in &self.config.flow {
            for id in step.referenced_nodes() {
                mentioned.insert(id.to_string());
            }
            match step {
                FlowStep::Node(id) => {
                    for prev in &frontier {
                        edges.push((prev.clone(), id.clone()));
                    }
                    frontier = vec![id.clone()];
                }
                FlowStep::Parallel(ids) => {
                    for prev in &frontier {
                        for id in ids {
                            edges.push((prev.clone(), id.clone()));
                        }
                    }
                    frontier = ids.clone();
                }
                FlowStep::Depends { node, depends_on } => {
                    for dep in depends_on {
                        edges.push((dep.clone(), node.clone()));
                    }
                    frontier = vec![node.clone()];
                }
            }
        }

        let mut dangling = Vec::new();
        for id in self.config.flow.iter().flat_map(FlowStep::referenced_nodes) {
            if !self.config.nodes.contains(id) && !dangling.iter().any(|d| d == id) {
                dangling.push(id.to_string());
            }
        }

        Inferred {
            edges,
            dangling,
            mentioned,
        }
    }

    fn assemble(&self, edges: &[(String, String)]) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        for (id, spec) in self.config.nodes.iter() {
            graph.add_node(id, spec.node_type.clone());
        }
        for (source, target) in edges {
            if graph.contains(source) && graph.contains(target) {
                // both ends are declared, so connect cannot fail
                let _ = graph.connect(source, "output", target, "input");
            }
        }
        graph
    }

    /// Build the graph. Fails on the first undeclared flow reference or on a cycle.
    pub fn build(&self) -> Result<WorkflowGraph, WorkflowError> {
        let inferred = self.infer();
        if let Some(missing) = inferred.dangling.into_iter().next() {
            return Err(WorkflowError::NodeNotFound(missing));
        }
        let graph = self.assemble(&inferred.edges);
        if let Some(cycle) = graph.find_cycle() {
            return Err(WorkflowError::CyclicDependency(cycle));
        }
        Ok(graph)
    }

    /// Collect every problem instead of stopping at the first one. Node
    /// types are only checked when a registry is supplied.
    pub fn validate(&self, registry: Option<&NodeRegistry>) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.config.nodes.is_empty() {
            report.errors.push("Workflow declares no nodes".to_string());
        }

        let inferred = self.infer();
        for missing in &inferred.dangling {
            report
                .errors
                .push(format!("Flow references undeclared node '{missing}'"));
        }

        if let Some(registry) = registry {
            for (id, spec) in self.config.nodes.iter() {
                if !registry.contains(&spec.node_type) {
                    report.errors.push(format!(
                        "Node '{id}' has unknown type '{}'",
                        spec.node_type
                    ));
                }
            }
        }

        let graph = self.assemble(&inferred.edges);
        if let Some(cycle) = graph.find_cycle() {
            report
                .errors
                .push(WorkflowError::CyclicDependency(cycle).to_string());
        }

        if !self.config.flow.is_empty() {
            for id in self.config.node_ids() {
                if !inferred.mentioned.contains(id) {
                    report.warnings.push(format!(
                        "Node '{id}' is not part of the flow and will run last"
                    ));
                }
            }
        }

        report.valid = report.errors.is_empty();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gilcore::NodeSpec;

    fn config(ids: &[&str], flow: Vec<FlowStep>) -> WorkflowConfig {
        let mut config = WorkflowConfig::new("test");
        for id in ids {
            config = config.with_node(*id, NodeSpec::new("LogMessage"));
        }
        for step in flow {
            config = config.with_step(step);
        }
        config
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn sequential_steps_chain() {
        let config = config(&["a", "b", "c"], vec!["a".into(), "b".into(), "c".into()]);
        let graph = GraphBuilder::new(&config).build().unwrap();
        let edges: Vec<String> = graph.connections().map(|c| c.to_string()).collect();
        assert_eq!(edges, vec!["a:output -> b:input", "b:output -> c:input"]);
        assert_eq!(graph.execution_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parallel_group_fans_out_and_in() {
        let config = config(
            &["start", "x", "y", "join"],
            vec!["start".into(), vec!["x", "y"].into(), "join".into()],
        );
        let graph = GraphBuilder::new(&config).build().unwrap();
        assert_eq!(graph.connections().count(), 4);
        assert_eq!(graph.dependencies("join"), vec!["x", "y"]);
        let order = graph.execution_order().unwrap();
        assert_eq!(order.first().map(String::as_str), Some("start"));
        assert_eq!(order.last().map(String::as_str), Some("join"));
    }

    #[test]
    fn dependency_step_resets_frontier() {
        let config = config(
            &["a", "b", "c", "d"],
            vec![
                "a".into(),
                "b".into(),
                FlowStep::depends("c", &["a"]),
                "d".into(),
            ],
        );
        let graph = GraphBuilder::new(&config).build().unwrap();
        assert_eq!(graph.dependencies("c"), vec!["a"]);
        assert_eq!(graph.dependencies("d"), vec!["c"]);
        let order = graph.execution_order().unwrap();
        assert!(position(&order, "a") < position(&order, "c"));
        assert!(position(&order, "c") < position(&order, "d"));
    }

    #[test]
    fn isolated_nodes_run_last_in_declaration_order() {
        let config = config(&["lone2", "a", "lone1", "b"], vec!["a".into(), "b".into()]);
        let graph = GraphBuilder::new(&config).build().unwrap();
        assert_eq!(
            graph.execution_order().unwrap(),
            vec!["a", "b", "lone2", "lone1"]
        );
    }

    #[test]
    fn order_respects_every_dependency() {
        let config = config(
            &["e", "d", "c", "b", "a"],
            vec![
                FlowStep::depends("b", &["a"]),
                FlowStep::depends("c", &["a", "b"]),
                FlowStep::depends("d", &["c"]),
                FlowStep::depends("e", &["b", "d"]),
            ],
        );
        let graph = GraphBuilder::new(&config).build().unwrap();
        let order = graph.execution_order().unwrap();
        assert_eq!(order.len(), 5);
        for conn in graph.connections() {
            assert!(position(&order, &conn.source_node) < position(&order, &conn.target_node));
        }
    }

    #[test]
    fn undeclared_reference_is_an_error() {
        let config = config(&["a"], vec!["a".into(), "ghost".into()]);
        let err = GraphBuilder::new(&config).build().unwrap_err();
        assert!(matches!(err, WorkflowError::NodeNotFound(id) if id == "ghost"));
    }

    #[test]
    fn cycle_is_reported_with_path() {
        let config = config(
            &["a", "b", "c"],
            vec![
                FlowStep::depends("b", &["a"]),
                FlowStep::depends("c", &["b"]),
                FlowStep::depends("a", &["c"]),
            ],
        );
        let err = GraphBuilder::new(&config).build().unwrap_err();
        match err {
            WorkflowError::CyclicDependency(path) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_connect_and_order() {
        let mut graph = WorkflowGraph::new();
        graph.add_node("src", "LogMessage");
        graph.add_node("dst", "SetVariable");
        graph.connect("src", "output", "dst", "value").unwrap();
        match graph.connect("src", "output", "nowhere", "input") {
            Err(WorkflowError::InvalidConnection(message)) => {
                assert_eq!(
                    message,
                    "src:output -> nowhere:input: node 'nowhere' is not declared"
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(graph.connections().count(), 1);
        assert_eq!(graph.execution_order().unwrap(), vec!["src", "dst"]);

        graph.connect("dst", "output", "src", "input").unwrap();
        assert!(matches!(
            graph.execution_order(),
            Err(WorkflowError::CyclicDependency(_))
        ));
    }

    #[test]
    fn validate_collects_all_problems() {
        let mut config = config(
            &["a", "b", "unused"],
            vec![
                FlowStep::depends("a", &["b"]),
                FlowStep::depends("b", &["a"]),
                "ghost".into(),
            ],
        );
        config = config.with_node("odd", NodeSpec::new("NoSuchType"));
        let mut registry = NodeRegistry::new();
        registry.register(std::sync::Arc::new(crate::registry::FnFactory::new(
            "LogMessage",
            |_, _| Err(gilcore::NodeError::Configuration("unused".into())),
        )));

        let report = GraphBuilder::new(&config).validate(Some(&registry));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("ghost")));
        assert!(report.errors.iter().any(|e| e.contains("NoSuchType")));
        assert!(report.errors.iter().any(|e| e.contains("Cyclic")));
        assert!(report.warnings.iter().any(|w| w.contains("unused")));
    }

    #[test]
    fn validate_empty_workflow() {
        let report = GraphBuilder::new(&WorkflowConfig::new("empty")).validate(None);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn mermaid_lists_nodes_and_edges() {
        let config = config(&["a", "b"], vec!["a".into(), "b".into()]);
        let graph = GraphBuilder::new(&config).build().unwrap();
        let diagram = graph.to_mermaid();
        assert!(diagram.starts_with("graph TD"));
        assert!(diagram.contains("a[a<br/>LogMessage]"));
        assert!(diagram.contains("a --> b"));
    }
}
