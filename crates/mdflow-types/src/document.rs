//! Document model for parsed markdown workflows.
//!
//! A `Document` is the typed, in-memory form of one markdown workflow file.
//! It is produced fresh by every parse and never mutated afterwards: an edit
//! to the source produces a new `Document` with a new content hash.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root value object for one parsed workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source path, or `None` for in-memory content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// The raw markdown text.
    pub raw: String,
    /// Stable hex digest of `raw`. Cache key and change fingerprint.
    pub content_hash: String,
    /// When this document was parsed.
    pub parsed_at: DateTime<Utc>,
    pub metadata: Metadata,
    /// Sections in source order.
    pub sections: Vec<Section>,
    pub variables: Vec<Variable>,
    /// Steps in source order.
    pub steps: Vec<Step>,
    /// Non-fatal problems found while parsing (non-strict mode only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseWarning>,
}

impl Document {
    /// True if at least one section of the given kind is present.
    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.sections.iter().any(|s| s.kind == kind)
    }

    /// Look up a step by its 1-based position.
    pub fn step_at(&self, position: usize) -> Option<&Step> {
        self.steps.iter().find(|s| s.position == position)
    }

    /// Look up a variable declaration by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A non-fatal parse problem, kept on the document for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based source line, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl ParseWarning {
    pub fn new(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Descriptive metadata of a workflow document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Semantic version string (e.g. "1.2.0"). Not enforced at parse time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Unordered, deduplicated tag set.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    /// Owned by the downstream execution engine; only carried here.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Metadata keys that did not map onto a known field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Workflow priority. Ordered: `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Ready,
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The recognised kinds of document section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Metadata,
    Variables,
    Steps,
    Description,
    Notes,
    Unknown,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Metadata => "metadata",
            SectionKind::Variables => "variables",
            SectionKind::Steps => "steps",
            SectionKind::Description => "description",
            SectionKind::Notes => "notes",
            SectionKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A titled block of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    /// Markdown heading level (1-6).
    pub level: u8,
    /// 0-based, unique and strictly increasing within a document.
    pub order: usize,
    /// 1-based line of the heading.
    pub line: usize,
    /// Raw markdown between this heading and the next section heading.
    pub content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Declared type of a workflow variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    String,
    Number,
    Boolean,
    DateTime,
    FilePath,
    Url,
    Json,
    StringArray,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::String => "string",
            VariableKind::Number => "number",
            VariableKind::Boolean => "boolean",
            VariableKind::DateTime => "datetime",
            VariableKind::FilePath => "filepath",
            VariableKind::Url => "url",
            VariableKind::Json => "json",
            VariableKind::StringArray => "string_array",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed variable value.
///
/// A default that failed coercion in non-strict mode is kept as `Text`
/// so the converter can report it precisely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    /// Raw, uncoerced text.
    Text(String),
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    FilePath(String),
    Url(String),
    Json(serde_json::Value),
    StringArray(Vec<String>),
}

impl VariableValue {
    /// The declared kind this value satisfies, or `None` for raw text.
    pub fn kind(&self) -> Option<VariableKind> {
        match self {
            VariableValue::Text(_) => None,
            VariableValue::String(_) => Some(VariableKind::String),
            VariableValue::Number(_) => Some(VariableKind::Number),
            VariableValue::Boolean(_) => Some(VariableKind::Boolean),
            VariableValue::DateTime(_) => Some(VariableKind::DateTime),
            VariableValue::FilePath(_) => Some(VariableKind::FilePath),
            VariableValue::Url(_) => Some(VariableKind::Url),
            VariableValue::Json(_) => Some(VariableKind::Json),
            VariableValue::StringArray(_) => Some(VariableKind::StringArray),
        }
    }

    /// Render the value the way it would be written in the source document.
    pub fn to_source_text(&self) -> String {
        match self {
            VariableValue::Text(s)
            | VariableValue::String(s)
            | VariableValue::FilePath(s)
            | VariableValue::Url(s) => s.clone(),
            VariableValue::Number(n) => n.to_string(),
            VariableValue::Boolean(b) => b.to_string(),
            VariableValue::DateTime(dt) => dt.to_rfc3339(),
            VariableValue::Json(v) => v.to_string(),
            VariableValue::StringArray(items) => items.join(", "),
        }
    }
}

/// A variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique within a document.
    pub name: String,
    pub kind: VariableKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<VariableValue>,
    #[serde(default)]
    pub description: String,
    /// Closed set of allowed values; empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The kind of work a step performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Task,
    Condition,
    Loop,
    Parallel,
    Delay,
    SubWorkflow,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Task => "task",
            StepKind::Condition => "condition",
            StepKind::Loop => "loop",
            StepKind::Parallel => "parallel",
            StepKind::Delay => "delay",
            StepKind::SubWorkflow => "sub_workflow",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A textual dependency reference, as written in `DependsOn:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum DependencyRef {
    /// Reference by step identifier (or title).
    Id(String),
    /// Reference by 1-based step position.
    Ordinal(usize),
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRef::Id(id) => f.write_str(id),
            DependencyRef::Ordinal(n) => write!(f, "#{n}"),
        }
    }
}

/// A unit of work in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Explicit identifier from an `Id:` line. Generated ids are assigned by the converter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: StepKind,
    /// Command text; may contain `{{name}}` placeholders.
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyRef>,
    /// Guard expression; opaque to the ingestion pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target document of a `SubWorkflow` step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow: Option<String>,
    /// 1-based position within the Steps section.
    pub position: usize,
    pub line: usize,
}

impl Step {
    /// Minimal step with the given name and position; every other field defaulted.
    pub fn named(name: impl Into<String>, position: usize) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: StepKind::Task,
            command: String::new(),
            parameters: BTreeMap::new(),
            depends_on: Vec::new(),
            condition: None,
            timeout_secs: None,
            retryable: false,
            description: None,
            sub_workflow: None,
            position,
            line: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_dependency_ref_display() {
        assert_eq!(DependencyRef::Id("build".into()).to_string(), "build");
        assert_eq!(DependencyRef::Ordinal(2).to_string(), "#2");
    }

    #[test]
    fn test_variable_value_kind() {
        assert_eq!(VariableValue::Number(3.0).kind(), Some(VariableKind::Number));
        assert_eq!(VariableValue::Text("x".into()).kind(), None);
    }

    #[test]
    fn test_variable_value_serde_shape() {
        let json = serde_json::to_value(VariableValue::Number(3.0)).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["value"], 3.0);
    }

    #[test]
    fn test_step_kind_serde_snake_case() {
        let json = serde_json::to_string(&StepKind::SubWorkflow).unwrap();
        assert_eq!(json, "\"sub_workflow\"");
    }
}
