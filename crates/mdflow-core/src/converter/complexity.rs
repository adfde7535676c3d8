//! Advisory complexity estimate for a document.
//!
//! Used for operational planning only. Nothing in the conversion path reads
//! the estimate, so it can never make a conversion fail.

use mdflow_types::document::Document;
use serde::Serialize;

use crate::ident::{self, ReferenceIndex};

/// Upper bound of [`ComplexityEstimate::score`].
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityEstimate {
    /// Bounded to `0.0..=10.0`.
    pub score: f64,
    pub step_count: usize,
    pub variable_count: usize,
    pub dependency_count: usize,
    /// Longest dependency chain, counted in steps.
    pub max_chain_depth: usize,
    pub estimated_time_ms: u64,
    pub estimated_memory_bytes: u64,
}

/// Longest dependency chain, counted in steps.
///
/// `adjacency[i]` lists the steps `i` depends on. Steps are settled in
/// dependency order in one pass; if a cycle leaves any step unsettled the
/// chain is unbounded and the step count is reported instead.
fn chain_depth(adjacency: &[Vec<usize>]) -> usize {
    let n = adjacency.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut waiting: Vec<usize> = Vec::with_capacity(n);
    for (node, deps) in adjacency.iter().enumerate() {
        waiting.push(deps.len());
        for &dep in deps {
            dependents[dep].push(node);
        }
    }

    let mut depth = vec![1usize; n];
    let mut ready: Vec<usize> = (0..n).filter(|&node| waiting[node] == 0).collect();
    let mut settled = 0;
    while let Some(node) = ready.pop() {
        settled += 1;
        for &dependent in &dependents[node] {
            depth[dependent] = depth[dependent].max(depth[node] + 1);
            waiting[dependent] -= 1;
            if waiting[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if settled < n {
        return n;
    }
    depth.into_iter().max().unwrap_or(0)
}

pub fn estimate(doc: &Document) -> ComplexityEstimate {
    let mut index = ReferenceIndex::new("");
    for (i, step) in doc.steps.iter().enumerate() {
        let id = step
            .id
            .clone()
            .unwrap_or_else(|| ident::generated_id("", &step.name, step.position));
        index.insert(i, &id, &step.name, step.position);
    }
    let adjacency: Vec<Vec<usize>> = doc
        .steps
        .iter()
        .map(|s| s.depends_on.iter().filter_map(|r| index.resolve(r)).collect())
        .collect();

    let step_count = doc.steps.len();
    let variable_count = doc.variables.len();
    let dependency_count: usize = adjacency.iter().map(Vec::len).sum();
    let max_chain_depth = chain_depth(&adjacency);

    let raw = 0.2 * step_count as f64
        + 0.1 * variable_count as f64
        + 0.15 * dependency_count as f64
        + 0.5 * max_chain_depth as f64;
    let score = (raw.clamp(0.0, MAX_SCORE) * 10.0).round() / 10.0;

    let estimated_time_ms = 1
        + (step_count as u64) / 4
        + (dependency_count as u64) / 8
        + (variable_count as u64) / 16
        + (max_chain_depth as u64) / 2;
    let estimated_memory_bytes = 4_096
        + doc.raw.len() as u64 * 2
        + step_count as u64 * 1_024
        + variable_count as u64 * 256
        + dependency_count as u64 * 64;

    ComplexityEstimate {
        score,
        step_count,
        variable_count,
        dependency_count,
        max_chain_depth,
        estimated_time_ms,
        estimated_memory_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::testing;
    use crate::parser::Parser;

    fn parse(content: &str) -> Document {
        Parser::new(testing::hasher()).parse(content).unwrap()
    }

    #[test]
    fn test_empty_document_scores_zero() {
        let estimate = estimate(&parse("# Nothing\n"));
        assert_eq!(estimate.score, 0.0);
        assert_eq!(estimate.max_chain_depth, 0);
        assert!(estimate.estimated_time_ms >= 1);
    }

    #[test]
    fn test_chain_depth_counts_longest_path() {
        let doc = parse(
            "## Steps\n- A\n- B\n  DependsOn: A\n- C\n  DependsOn: B\n- D\n  DependsOn: A\n",
        );
        let estimate = estimate(&doc);
        assert_eq!(estimate.step_count, 4);
        assert_eq!(estimate.dependency_count, 3);
        assert_eq!(estimate.max_chain_depth, 3);
        assert!(estimate.score > 0.0);
    }

    #[test]
    fn test_chain_depth_with_duplicate_and_shared_dependencies() {
        // 0 <- 1 (twice) <- 2, and 3 depends on both 0 and 2.
        let adjacency = vec![vec![], vec![0, 0], vec![1], vec![0, 2]];
        assert_eq!(chain_depth(&adjacency), 4);
        assert_eq!(chain_depth(&[vec![0]]), 1);
        assert_eq!(chain_depth(&[]), 0);
    }

    #[test]
    fn test_score_is_bounded_even_for_cycles() {
        let mut content = String::from("## Steps\n");
        for i in 0..200 {
            content.push_str(&format!("- S{i}\n  DependsOn: S{}\n", (i + 1) % 200));
        }
        let estimate = estimate(&parse(&content));
        assert_eq!(estimate.score, MAX_SCORE);
        assert_eq!(estimate.max_chain_depth, 200);
    }
}
