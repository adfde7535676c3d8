use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::SectionKind;
use crate::validation::ValidationIssue;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Where in the source a parse error happened. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: Option<PathBuf>,
    /// 1-based line number.
    pub line: Option<usize>,
    /// The offending source line, trimmed.
    pub excerpt: Option<String>,
}

impl SourceLocation {
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.line.is_none() && self.excerpt.is_none()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        f.write_str(" (at ")?;
        match &self.path {
            Some(path) => write!(f, "{}", path.display())?,
            None => f.write_str("<memory>")?,
        }
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        if let Some(excerpt) = &self.excerpt {
            write!(f, ": `{excerpt}`")?;
        }
        f.write_str(")")
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("file not found")]
    FileNotFound,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("file size of {size} bytes exceeds the max_file_size limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("content is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("nesting depth {depth} exceeds the max_nesting_depth limit of {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    #[error("parse timeout of {limit_ms} ms exceeded")]
    Timeout { limit_ms: u64 },

    #[error("required section '{0}' is missing")]
    MissingSection(SectionKind),

    #[error("document contains no recognised sections")]
    NoRecognisedSections,

    #[error("malformed variable declaration: {0}")]
    MalformedVariable(String),

    #[error("malformed step: {0}")]
    MalformedStep(String),

    #[error("invalid value for variable '{variable}': {reason}")]
    InvalidValue { variable: String, reason: String },

    #[error("invalid metadata value for '{key}': {reason}")]
    InvalidMetadata { key: String, reason: String },

    #[error("broken document link '{0}'")]
    BrokenLink(String),
}

/// A typed parse failure carrying source location context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{location}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            location: SourceLocation::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.location.path = Some(path.into());
        self
    }

    /// Attach a 1-based line number and the trimmed source line.
    pub fn at_line(mut self, line: usize, excerpt: &str) -> Self {
        self.location.line = Some(line);
        let excerpt = excerpt.trim();
        if !excerpt.is_empty() {
            self.location.excerpt = Some(excerpt.chars().take(80).collect());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Conversion errors
// ---------------------------------------------------------------------------

/// The converter phase a failure or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPhase {
    PreValidation,
    MetadataProcessing,
    VariableProcessing,
    StepConversion,
    DependencyResolution,
    ResultValidation,
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversionPhase::PreValidation => "pre-validation",
            ConversionPhase::MetadataProcessing => "metadata processing",
            ConversionPhase::VariableProcessing => "variable processing",
            ConversionPhase::StepConversion => "step conversion",
            ConversionPhase::DependencyResolution => "dependency resolution",
            ConversionPhase::ResultValidation => "result validation",
        };
        f.write_str(name)
    }
}

/// Errors that abort conversion of a document into a workflow graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("document failed validation with {} error(s): {}", .issues.len(), first_message(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("default value of variable '{variable}' does not match its declared type: {reason}")]
    InvalidDefault { variable: String, reason: String },

    #[error("step '{name}' at position {position} has no identifier and id generation is disabled")]
    MissingIdentifier { position: usize, name: String },

    #[error("duplicate step identifier '{id}' (steps at positions {first} and {second})")]
    DuplicateIdentifier {
        id: String,
        first: usize,
        second: usize,
    },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("conversion time budget of {budget_ms} ms exceeded during {phase}")]
    TimeBudgetExceeded { phase: ConversionPhase, budget_ms: u64 },

    #[error("inconsistent graph: {0}")]
    InconsistentGraph(String),
}

fn first_message(issues: &[ValidationIssue]) -> String {
    issues
        .first()
        .map(|i| i.to_string())
        .unwrap_or_default()
}

impl ConversionError {
    /// The phase that produced this error.
    pub fn phase(&self) -> ConversionPhase {
        match self {
            ConversionError::Validation { .. } => ConversionPhase::PreValidation,
            ConversionError::InvalidMetadata(_) => ConversionPhase::MetadataProcessing,
            ConversionError::InvalidDefault { .. } => ConversionPhase::VariableProcessing,
            ConversionError::MissingIdentifier { .. }
            | ConversionError::DuplicateIdentifier { .. } => ConversionPhase::StepConversion,
            ConversionError::Cycle { .. } => ConversionPhase::DependencyResolution,
            ConversionError::TimeBudgetExceeded { phase, .. } => *phase,
            ConversionError::InconsistentGraph(_) => ConversionPhase::ResultValidation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::IssueCode;

    #[test]
    fn test_parse_error_display_with_location() {
        let err = ParseError::new(ParseErrorKind::MalformedVariable("missing type".into()))
            .with_path("flows/build.md")
            .at_line(7, "  - **count** (,): retries  ");
        let msg = err.to_string();
        assert!(msg.starts_with("malformed variable declaration: missing type"));
        assert!(msg.contains("flows/build.md:7"), "got: {msg}");
        assert!(msg.contains("`- **count** (,): retries`"), "got: {msg}");
    }

    #[test]
    fn test_parse_error_display_without_location() {
        let err = ParseError::new(ParseErrorKind::Timeout { limit_ms: 50 });
        assert_eq!(err.to_string(), "parse timeout of 50 ms exceeded");
    }

    #[test]
    fn test_file_too_large_names_limit() {
        let err = ParseError::new(ParseErrorKind::FileTooLarge {
            size: 2048,
            limit: 1024,
        });
        assert!(err.to_string().contains("max_file_size"));
    }

    #[test]
    fn test_cycle_error_names_path() {
        let err = ConversionError::Cycle {
            path: vec!["build".into(), "deploy".into(), "build".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: build -> deploy -> build"
        );
        assert_eq!(err.phase(), ConversionPhase::DependencyResolution);
    }

    #[test]
    fn test_validation_error_reports_first_issue() {
        let err = ConversionError::Validation {
            issues: vec![ValidationIssue::error(
                IssueCode::DuplicateVariable,
                "duplicate variable 'count'",
            )],
        };
        assert!(err.to_string().contains("1 error(s): duplicate variable 'count'"));
        assert_eq!(err.phase(), ConversionPhase::PreValidation);
    }

    #[test]
    fn test_time_budget_phase_is_carried() {
        let err = ConversionError::TimeBudgetExceeded {
            phase: ConversionPhase::StepConversion,
            budget_ms: 10,
        };
        assert_eq!(err.phase(), ConversionPhase::StepConversion);
    }
}
