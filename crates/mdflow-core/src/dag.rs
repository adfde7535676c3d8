//! Execution plan utilities over a converted graph.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. Topological
//! sort confirms acyclicity, and depth-based grouping produces parallel
//! execution waves where all steps in a wave can run concurrently.

use std::collections::{HashMap, HashSet};

use mdflow_types::error::ConversionError;
use mdflow_types::graph::{GraphStep, WorkflowGraph};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

/// Build a petgraph view of the workflow: edge from dependency to dependent.
fn build(graph: &WorkflowGraph) -> Result<(DiGraph<&str, ()>, Vec<NodeIndex>), ConversionError> {
    let id_to_idx: HashMap<&str, usize> = graph
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut dag = DiGraph::<&str, ()>::new();
    let nodes: Vec<_> = graph.steps.iter().map(|s| dag.add_node(s.id.as_str())).collect();

    for edge in &graph.edges {
        let dependent = id_to_idx.get(edge.from.as_str());
        let dependency = id_to_idx.get(edge.to.as_str());
        let (Some(&dependent), Some(&dependency)) = (dependent, dependency) else {
            return Err(ConversionError::InconsistentGraph(format!(
                "edge {} -> {} references an unknown step",
                edge.from, edge.to
            )));
        };
        dag.add_edge(nodes[dependency], nodes[dependent], ());
    }
    Ok((dag, nodes))
}

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Group steps into parallel waves.
///
/// Each wave contains steps whose dependencies are all satisfied by earlier
/// waves. Within a wave steps keep source order.
pub fn execution_waves(graph: &WorkflowGraph) -> Result<Vec<Vec<&GraphStep>>, ConversionError> {
    if graph.steps.is_empty() {
        return Ok(vec![]);
    }

    let (dag, nodes) = build(graph)?;
    let sorted = toposort(&dag, None).map_err(|cycle| {
        ConversionError::InconsistentGraph(format!(
            "cycle involving step '{}'",
            dag[cycle.node_id()]
        ))
    })?;

    // Dependencies precede dependents in `sorted`, so one pass settles every
    // depth. Root steps have depth 0.
    let mut depths = vec![0usize; dag.node_count()];
    for node in sorted {
        depths[node.index()] = dag
            .neighbors_directed(node, Direction::Incoming)
            .map(|dependency| depths[dependency.index()] + 1)
            .max()
            .unwrap_or(0);
    }

    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&GraphStep>> = vec![vec![]; max_depth + 1];
    for (step, node) in graph.steps.iter().zip(&nodes) {
        waves[depths[node.index()]].push(step);
    }
    Ok(waves)
}

/// Step identifiers in an order where every dependency precedes its dependents.
pub fn topological_order(graph: &WorkflowGraph) -> Result<Vec<&str>, ConversionError> {
    Ok(execution_waves(graph)?
        .into_iter()
        .flatten()
        .map(|step| step.id.as_str())
        .collect())
}

// ---------------------------------------------------------------------------
// Transitive dependency closure
// ---------------------------------------------------------------------------

/// Every step `step_id` depends on, directly or indirectly, in source order.
///
/// Returns an empty vec for an unknown step.
pub fn transitive_dependencies<'a>(graph: &'a WorkflowGraph, step_id: &str) -> Vec<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![step_id];
    while let Some(current) = stack.pop() {
        for &dependency in adjacency.get(current).into_iter().flatten() {
            if visited.insert(dependency) {
                stack.push(dependency);
            }
        }
    }

    graph
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| visited.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdflow_types::document::{Metadata, StepKind};
    use mdflow_types::graph::DependencyEdge;

    fn step(id: &str, position: usize) -> GraphStep {
        GraphStep {
            id: id.to_string(),
            name: id.to_string(),
            kind: StepKind::Task,
            command: String::new(),
            parameters: Default::default(),
            depends_on: vec![],
            condition: None,
            timeout_secs: None,
            retryable: false,
            description: None,
            sub_workflow: None,
            position,
            bindings: vec![],
        }
    }

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> WorkflowGraph {
        let mut steps: Vec<GraphStep> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| step(id, i + 1))
            .collect();
        for (from, to) in edges {
            if let Some(s) = steps.iter_mut().find(|s| s.id == *from) {
                s.depends_on.push(to.to_string());
            }
        }
        WorkflowGraph {
            content_hash: "h".into(),
            source: None,
            metadata: Metadata::default(),
            variables: vec![],
            steps,
            edges: edges.iter().map(|(f, t)| DependencyEdge::new(*f, *t)).collect(),
            warnings: vec![],
            converted_at: Utc::now(),
        }
    }

    fn wave_ids<'a>(waves: &[Vec<&'a GraphStep>]) -> Vec<Vec<&'a str>> {
        waves
            .iter()
            .map(|w| w.iter().map(|s| s.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_no_dependencies_single_wave() {
        let g = graph(&["a", "b", "c"], &[]);
        let waves = execution_waves(&g).unwrap();
        assert_eq!(wave_ids(&waves), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_diamond_three_waves() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
        );
        let waves = execution_waves(&g).unwrap();
        assert_eq!(wave_ids(&waves), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_dependencies_declared_after_dependents() {
        let g = graph(&["deploy", "build"], &[("deploy", "build")]);
        assert_eq!(topological_order(&g).unwrap(), vec!["build", "deploy"]);
    }

    #[test]
    fn test_cycle_is_inconsistent() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(matches!(
            execution_waves(&g).unwrap_err(),
            ConversionError::InconsistentGraph(_)
        ));
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let g = graph(&["a"], &[("a", "ghost")]);
        assert!(topological_order(&g).is_err());
    }

    #[test]
    fn test_empty_graph() {
        let g = graph(&[], &[]);
        assert!(execution_waves(&g).unwrap().is_empty());
        assert!(topological_order(&g).unwrap().is_empty());
    }

    #[test]
    fn test_long_chain_settles_in_one_pass() {
        // Declared in reverse: every step depends on the one listed after it.
        let n = 5_000;
        let ids: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let edges: Vec<(&str, &str)> = refs.windows(2).map(|w| (w[0], w[1])).collect();
        let g = graph(&refs, &edges);

        let waves = execution_waves(&g).unwrap();
        assert_eq!(waves.len(), n);
        assert_eq!(waves[0][0].id, format!("s{}", n - 1));
        assert_eq!(waves[n - 1][0].id, "s0");
        assert_eq!(transitive_dependencies(&g, "s0").len(), n - 1);
    }

    #[test]
    fn test_transitive_dependencies() {
        let g = graph(
            &["fetch", "build", "test", "deploy"],
            &[("build", "fetch"), ("test", "build"), ("deploy", "test")],
        );
        assert_eq!(transitive_dependencies(&g, "deploy"), vec!["fetch", "build", "test"]);
        assert!(transitive_dependencies(&g, "fetch").is_empty());
        assert!(transitive_dependencies(&g, "unknown").is_empty());
    }
}
