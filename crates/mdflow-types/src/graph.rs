//! Executable workflow graph produced by the converter.
//!
//! A `WorkflowGraph` is the dependency-resolved lowering of a `Document`.
//! Edges are keyed by step identifier only (ordinal references are rewritten),
//! and the edge set is guaranteed acyclic. Graphs are replaced wholesale on
//! re-conversion, never patched.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Metadata, StepKind, VariableKind, VariableValue};
use crate::error::ConversionPhase;

/// The converted, executable workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Content hash of the source document (cache key).
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Carried through from the document unchanged.
    pub metadata: Metadata,
    pub variables: Vec<GraphVariable>,
    /// Steps in source order.
    pub steps: Vec<GraphStep>,
    /// Resolved dependency edges.
    pub edges: Vec<DependencyEdge>,
    /// Non-fatal findings (dropped edges, validation warnings, unbound placeholders).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConversionWarning>,
    pub converted_at: DateTime<Utc>,
}

impl WorkflowGraph {
    /// Look up a step by its final identifier.
    pub fn step(&self, id: &str) -> Option<&GraphStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn variable(&self, name: &str) -> Option<&GraphVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Identifiers the given step depends on.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Identifiers of steps that depend on the given step.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.as_str())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// A variable declaration lowered to its graph form, default coerced to its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphVariable {
    pub name: String,
    pub kind: VariableKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<VariableValue>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

/// A step with its final identifier and resolved dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStep {
    /// Final identifier, unique within the graph.
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    /// Command text with placeholders rewritten (or left for the executor).
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    /// Final identifiers of the steps this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow: Option<String>,
    /// 1-based position in the source document.
    pub position: usize,
    /// Variable names this step binds at execution time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<String>,
}

/// A resolved dependency: `from` must wait for `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The dependent step.
    pub from: String,
    /// The step it depends on.
    pub to: String,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A non-fatal conversion finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarning {
    pub phase: ConversionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

impl ConversionWarning {
    pub fn new(phase: ConversionPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            step: None,
            message: message.into(),
        }
    }

    pub fn for_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}
