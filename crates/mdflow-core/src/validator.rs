//! Structural validation of parsed documents.
//!
//! Every check runs on every call, even after an earlier check failed, so
//! the report is exhaustive. Hard errors block conversion; warnings are
//! surfaced to the caller and never block anything.

use std::collections::HashMap;

use mdflow_types::document::{Document, SectionKind, StepKind};
use mdflow_types::validation::{IssueCode, ValidationIssue, ValidationReport};

use crate::coerce;
use crate::ident::{self, ReferenceIndex};

/// Sections a document must contain when no explicit list is given.
pub const DEFAULT_REQUIRED_SECTIONS: &[SectionKind] = &[SectionKind::Steps];

/// Validate with the default required sections.
pub fn validate(doc: &Document) -> ValidationReport {
    validate_with(doc, DEFAULT_REQUIRED_SECTIONS)
}

/// Validate, requiring each of `required_sections` to be present at least once.
pub fn validate_with(doc: &Document, required_sections: &[SectionKind]) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_sections(doc, required_sections, &mut report);
    check_steps(doc, &mut report);
    check_dependencies(doc, &mut report);
    check_step_ids(doc, &mut report);
    check_variables(doc, &mut report);
    check_version(doc, &mut report);

    tracing::debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated document"
    );
    report
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_sections(doc: &Document, required: &[SectionKind], report: &mut ValidationReport) {
    for kind in required {
        if !doc.has_section(*kind) {
            report.push(ValidationIssue::error(
                IssueCode::MissingSection,
                format!("required section '{kind}' is missing"),
            ));
        }
    }
}

fn check_steps(doc: &Document, report: &mut ValidationReport) {
    if doc.steps.is_empty() {
        report.push(ValidationIssue::warning(
            IssueCode::NoSteps,
            "document declares no steps",
        ));
    }
    for step in &doc.steps {
        if step.name.trim().is_empty() {
            report.push(
                ValidationIssue::error(
                    IssueCode::EmptyStepName,
                    format!("step at position {} has an empty name", step.position),
                )
                .at_line(step.line),
            );
            continue;
        }
        if step.kind == StepKind::Task && step.command.trim().is_empty() {
            report.push(
                ValidationIssue::warning(
                    IssueCode::EmptyCommand,
                    format!("task step '{}' has no command", step.name),
                )
                .for_step(&step.name)
                .at_line(step.line),
            );
        }
    }
}

fn check_dependencies(doc: &Document, report: &mut ValidationReport) {
    let mut index = ReferenceIndex::new("");
    for (i, step) in doc.steps.iter().enumerate() {
        let id = step
            .id
            .clone()
            .unwrap_or_else(|| ident::generated_id("", &step.name, step.position));
        index.insert(i, &id, &step.name, step.position);
    }

    for step in &doc.steps {
        for reference in &step.depends_on {
            if index.resolve(reference).is_none() {
                // Dangling references are soft: the converter drops the edge.
                report.push(
                    ValidationIssue::warning(
                        IssueCode::UnresolvedDependency,
                        format!(
                            "step '{}' depends on '{reference}', which matches no step",
                            step.name
                        ),
                    )
                    .for_step(&step.name)
                    .at_line(step.line),
                );
            }
        }
    }
}

fn check_step_ids(doc: &Document, report: &mut ValidationReport) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for step in &doc.steps {
        let Some(id) = step.id.as_deref() else {
            continue;
        };
        if let Some(first) = seen.insert(id, step.position) {
            report.push(
                ValidationIssue::error(
                    IssueCode::DuplicateStepId,
                    format!(
                        "step id '{id}' is used by steps at positions {first} and {}",
                        step.position
                    ),
                )
                .for_step(id)
                .at_line(step.line),
            );
        }
    }
}

fn check_variables(doc: &Document, report: &mut ValidationReport) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for variable in &doc.variables {
        if let Some(first_line) = seen.insert(variable.name.as_str(), variable.line) {
            report.push(
                ValidationIssue::error(
                    IssueCode::DuplicateVariable,
                    format!(
                        "variable '{}' is declared more than once (first at line {first_line})",
                        variable.name
                    ),
                )
                .for_variable(&variable.name)
                .at_line(variable.line),
            );
        }

        if variable.required && variable.default.is_none() {
            report.push(
                ValidationIssue::warning(
                    IssueCode::RequiredWithoutDefault,
                    format!(
                        "required variable '{}' has no default; the executor must supply it",
                        variable.name
                    ),
                )
                .for_variable(&variable.name)
                .at_line(variable.line),
            );
        }

        if variable.allowed_values.is_empty() {
            continue;
        }
        let mut allowed = Vec::with_capacity(variable.allowed_values.len());
        for raw in &variable.allowed_values {
            match coerce::coerce(raw, variable.kind) {
                Ok(value) => allowed.push(value),
                Err(reason) => report.push(
                    ValidationIssue::error(
                        IssueCode::InvalidAllowedValue,
                        format!(
                            "allowed value '{raw}' of variable '{}' is not a valid {}: {reason}",
                            variable.name, variable.kind
                        ),
                    )
                    .for_variable(&variable.name)
                    .at_line(variable.line),
                ),
            }
        }
        if let Some(default) = &variable.default {
            let listed = allowed.contains(default)
                || variable.allowed_values.contains(&default.to_source_text());
            if !listed {
                report.push(
                    ValidationIssue::error(
                        IssueCode::DefaultNotAllowed,
                        format!(
                            "default '{}' of variable '{}' is not one of: {}",
                            default.to_source_text(),
                            variable.name,
                            variable.allowed_values.join(", ")
                        ),
                    )
                    .for_variable(&variable.name)
                    .at_line(variable.line),
                );
            }
        }
    }
}

fn check_version(doc: &Document, report: &mut ValidationReport) {
    let Some(version) = doc.metadata.version.as_deref() else {
        return;
    };
    let trimmed = version.trim().trim_start_matches('v');
    if let Err(e) = semver::Version::parse(trimmed) {
        report.push(ValidationIssue::warning(
            IssueCode::InvalidVersion,
            format!("version '{version}' is not a semantic version: {e}"),
        ));
    }
}
