//! Document -> WorkflowGraph converter.
//!
//! Runs in fixed phases, each tagged with a [`ConversionPhase`]:
//!
//! 1. PreValidation: re-run the validator; hard errors abort.
//! 2. MetadataProcessing: carry metadata through, rejecting impossible dates.
//! 3. VariableProcessing: coerce every default to its declared type.
//! 4. StepConversion: assign final step identifiers.
//! 5. DependencyResolution: resolve references, drop dangling ones, reject cycles.
//! 6. StepConversion (again): rewrite `{{name}}` placeholders into bindings.
//! 7. ResultValidation: confirm the assembled graph sorts topologically.
//!
//! The time budget is checked between phases and before each step is lowered.

pub mod complexity;
mod resolver;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use mdflow_types::config::ConversionOptions;
use mdflow_types::document::{Document, Step};
use mdflow_types::error::{ConversionError, ConversionPhase};
use mdflow_types::graph::{ConversionWarning, DependencyEdge, GraphStep, GraphVariable, WorkflowGraph};

use crate::{coerce, dag, placeholder, validator};

pub use complexity::{ComplexityEstimate, estimate};

/// Wall-clock budget for one conversion. Zero means unbounded.
struct Budget {
    started: Instant,
    limit: Option<Duration>,
}

impl Budget {
    fn new(options: &ConversionOptions) -> Self {
        Self {
            started: Instant::now(),
            limit: (options.time_budget_ms > 0).then(|| options.time_budget()),
        }
    }

    fn check(&self, phase: ConversionPhase) -> Result<(), ConversionError> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => {
                Err(ConversionError::TimeBudgetExceeded {
                    phase,
                    budget_ms: limit.as_millis() as u64,
                })
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

fn pre_validate(
    doc: &Document,
    options: &ConversionOptions,
    warnings: &mut Vec<ConversionWarning>,
) -> Result<(), ConversionError> {
    let report = validator::validate_with(doc, &options.required_sections);
    if !report.is_valid() {
        return Err(ConversionError::Validation {
            issues: report.errors,
        });
    }
    warnings.extend(report.warnings.into_iter().map(|issue| {
        let warning = ConversionWarning::new(ConversionPhase::PreValidation, issue.to_string());
        match issue.step {
            Some(step) => warning.for_step(step),
            None => warning,
        }
    }));
    Ok(())
}

fn process_metadata(doc: &Document) -> Result<(), ConversionError> {
    if let (Some(created), Some(updated)) = (doc.metadata.created_at, doc.metadata.updated_at) {
        if updated < created {
            return Err(ConversionError::InvalidMetadata(format!(
                "updated timestamp {updated} precedes created timestamp {created}"
            )));
        }
    }
    Ok(())
}

fn process_variables(doc: &Document) -> Result<Vec<GraphVariable>, ConversionError> {
    doc.variables
        .iter()
        .map(|variable| {
            let default = variable
                .default
                .as_ref()
                .map(|value| coerce::conform(value, variable.kind))
                .transpose()
                .map_err(|reason| ConversionError::InvalidDefault {
                    variable: variable.name.clone(),
                    reason,
                })?;
            Ok(GraphVariable {
                name: variable.name.clone(),
                kind: variable.kind,
                required: variable.required,
                default,
                description: variable.description.clone(),
                allowed_values: variable.allowed_values.clone(),
            })
        })
        .collect()
}

/// Lower one step, rewriting placeholders in its command and parameter values.
fn lower_step(
    step: &Step,
    id: &str,
    depends_on: Vec<String>,
    variables: &[GraphVariable],
    options: &ConversionOptions,
    warnings: &mut Vec<ConversionWarning>,
) -> GraphStep {
    let is_declared = |name: &str| variables.iter().any(|v| v.name == name);
    let mut bindings: Vec<String> = Vec::new();
    let mut undeclared: Vec<String> = Vec::new();
    let mut rewrite = |text: &str| {
        let out = placeholder::rewrite(text, options.substitute_placeholders, is_declared);
        for name in out.bound {
            if !bindings.contains(&name) {
                bindings.push(name);
            }
        }
        for name in out.undeclared {
            if !undeclared.contains(&name) {
                undeclared.push(name);
            }
        }
        out.text
    };

    let command = rewrite(&step.command);
    let parameters = step
        .parameters
        .iter()
        .map(|(key, value)| (key.clone(), rewrite(value)))
        .collect();

    for name in undeclared {
        tracing::warn!(step_id = %id, placeholder = %name, "placeholder names no declared variable");
        warnings.push(
            ConversionWarning::new(
                ConversionPhase::StepConversion,
                format!("placeholder '{{{{{name}}}}}' in step '{id}' names no declared variable"),
            )
            .for_step(id),
        );
    }

    GraphStep {
        id: id.to_string(),
        name: step.name.clone(),
        kind: step.kind,
        command,
        parameters,
        depends_on,
        condition: step.condition.clone(),
        timeout_secs: step.timeout_secs,
        retryable: step.retryable,
        description: step.description.clone(),
        sub_workflow: step.sub_workflow.clone(),
        position: step.position,
        bindings,
    }
}

fn check_result(graph: &WorkflowGraph) -> Result<(), ConversionError> {
    let ids: HashSet<&str> = graph.steps.iter().map(|s| s.id.as_str()).collect();
    for edge in &graph.edges {
        if !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str()) {
            return Err(ConversionError::InconsistentGraph(format!(
                "edge {} -> {} references a missing step",
                edge.from, edge.to
            )));
        }
    }
    dag::topological_order(graph).map(|_| ())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Lower a document into an executable, acyclic workflow graph.
pub fn convert(doc: &Document, options: &ConversionOptions) -> Result<WorkflowGraph, ConversionError> {
    let budget = Budget::new(options);
    let mut warnings = Vec::new();

    pre_validate(doc, options, &mut warnings)?;
    budget.check(ConversionPhase::PreValidation)?;

    process_metadata(doc)?;
    budget.check(ConversionPhase::MetadataProcessing)?;

    let variables = process_variables(doc)?;
    budget.check(ConversionPhase::VariableProcessing)?;

    let ids = resolver::assign_ids(&doc.steps, options)?;
    budget.check(ConversionPhase::StepConversion)?;

    let resolution = resolver::resolve(&doc.steps, &ids, &options.id_prefix);
    warnings.extend(resolution.warnings);
    resolver::detect_cycle(&ids, &resolution.depends_on)?;
    budget.check(ConversionPhase::DependencyResolution)?;

    let mut steps = Vec::with_capacity(doc.steps.len());
    let mut edges = Vec::new();
    for ((step, id), depends_on) in doc.steps.iter().zip(&ids).zip(resolution.depends_on) {
        budget.check(ConversionPhase::StepConversion)?;
        edges.extend(depends_on.iter().map(|dep| DependencyEdge::new(id, dep)));
        steps.push(lower_step(step, id, depends_on, &variables, options, &mut warnings));
    }

    let graph = WorkflowGraph {
        content_hash: doc.content_hash.clone(),
        source: doc.source.clone(),
        metadata: doc.metadata.clone(),
        variables,
        steps,
        edges,
        warnings,
        converted_at: Utc::now(),
    };
    check_result(&graph)?;
    budget.check(ConversionPhase::ResultValidation)?;

    tracing::debug!(
        hash = %graph.content_hash,
        steps = graph.steps.len(),
        edges = graph.edges.len(),
        warnings = graph.warnings.len(),
        "converted workflow document"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdflow_types::document::{SectionKind, VariableKind, VariableValue};
    use mdflow_types::validation::IssueCode;

    use crate::hash::testing;
    use crate::parser::Parser;

    fn parse(content: &str) -> Document {
        Parser::new(testing::hasher()).parse(content).unwrap()
    }

    fn convert_default(content: &str) -> Result<WorkflowGraph, ConversionError> {
        convert(&parse(content), &ConversionOptions::default())
    }

    #[test]
    fn test_single_variable_single_step() {
        let graph = convert_default(
            "# Build\n## Variables\n- **count** (number, optional, default: 3): retries\n## Steps\n- Build\n  Command: dotnet build\n",
        )
        .unwrap();
        assert_eq!(graph.variables.len(), 1);
        assert_eq!(graph.variables[0].kind, VariableKind::Number);
        assert_eq!(graph.variables[0].default, Some(VariableValue::Number(3.0)));
        assert_eq!(graph.steps.len(), 1);
        assert_eq!(graph.steps[0].id, "build");
        assert!(graph.steps[0].depends_on.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_two_steps_one_edge() {
        let graph = convert_default(
            "## Steps\n- Deploy\n  Command: ship\n  DependsOn: Build\n- Build\n  Command: make\n",
        )
        .unwrap();
        assert_eq!(graph.edges, vec![DependencyEdge::new("deploy", "build")]);
        assert_eq!(graph.dependencies_of("deploy"), vec!["build"]);
        assert_eq!(graph.dependents_of("build"), vec!["deploy"]);
    }

    #[test]
    fn test_cycle_fails_naming_both_steps() {
        let err = convert_default(
            "## Steps\n- Build\n  Command: make\n  DependsOn: Deploy\n- Deploy\n  Command: ship\n  DependsOn: Build\n",
        )
        .unwrap_err();
        assert_eq!(err.phase(), ConversionPhase::DependencyResolution);
        let ConversionError::Cycle { path } = &err else {
            panic!("expected cycle, got {err:?}");
        };
        assert!(path.contains(&"build".to_string()));
        assert!(path.contains(&"deploy".to_string()));
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn test_ordinal_reference_rewritten_to_id() {
        let graph = convert_default(
            "## Steps\n1. Fetch\n   Command: git pull\n2. Build\n   Command: make\n   DependsOn: #1\n",
        )
        .unwrap();
        assert_eq!(graph.steps[1].depends_on, vec!["fetch".to_string()]);
    }

    #[test]
    fn test_dangling_reference_is_warning() {
        let graph = convert_default("## Steps\n- Deploy\n  Command: ship\n  DependsOn: Build\n").unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.phase == ConversionPhase::DependencyResolution));
        // The validator's soft warning is carried too.
        assert!(graph.warnings.iter().any(|w| w.phase == ConversionPhase::PreValidation));
    }

    #[test]
    fn test_duplicate_generated_id_is_hard_error() {
        let err = convert_default("## Steps\n- Build\n  Command: a\n- build\n  Command: b\n").unwrap_err();
        assert!(matches!(err, ConversionError::DuplicateIdentifier { ref id, first: 1, second: 2 } if id == "build"));
        assert_eq!(err.phase(), ConversionPhase::StepConversion);
    }

    #[test]
    fn test_validation_errors_abort() {
        let err = convert_default("## Variables\n- **x** (string, optional): a\n- **x** (string, optional): b\n## Steps\n- A\n  Command: a\n")
            .unwrap_err();
        let ConversionError::Validation { issues } = &err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(issues.iter().any(|i| i.code == IssueCode::DuplicateVariable));
        assert_eq!(err.phase(), ConversionPhase::PreValidation);
    }

    #[test]
    fn test_missing_required_section() {
        let doc = parse("## Variables\n- **x** (string, optional): a\n");
        let err = convert(&doc, &ConversionOptions::default()).unwrap_err();
        assert!(matches!(err, ConversionError::Validation { .. }));

        let options = ConversionOptions {
            required_sections: vec![SectionKind::Variables],
            ..ConversionOptions::default()
        };
        assert!(convert(&doc, &options).is_ok());
    }

    #[test]
    fn test_uncoercible_default_is_hard_error() {
        let doc = parse("## Variables\n- **count** (number, optional, default: many): n\n## Steps\n- A\n  Command: a\n");
        let err = convert(&doc, &ConversionOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ConversionError::InvalidDefault {
                variable: "count".into(),
                reason: "'many' is not a number".into()
            }
        );
    }

    #[test]
    fn test_impossible_dates_rejected() {
        let doc = parse(
            "## Metadata\n- Created: 2024-05-01\n- Updated: 2024-01-01\n## Steps\n- A\n  Command: a\n",
        );
        let err = convert(&doc, &ConversionOptions::default()).unwrap_err();
        assert_eq!(err.phase(), ConversionPhase::MetadataProcessing);
    }

    #[test]
    fn test_placeholder_substitution() {
        let content = "## Variables\n- **env** (string, required): target\n## Steps\n- Deploy\n  Command: deploy --env {{env}} --region {{region}}\n  Parameters:\n    target: {{ env }}\n";
        let graph = convert_default(content).unwrap();
        let step = &graph.steps[0];
        assert_eq!(step.command, "deploy --env {{ variables.env }} --region {{region}}");
        assert_eq!(
            step.parameters.get("target").map(String::as_str),
            Some("{{ variables.env }}")
        );
        assert_eq!(step.bindings, vec!["env".to_string()]);
        assert!(graph
            .warnings
            .iter()
            .any(|w| w.message.contains("region") && w.step.as_deref() == Some("deploy")));
    }

    #[test]
    fn test_deferred_placeholders() {
        let options = ConversionOptions {
            substitute_placeholders: false,
            ..ConversionOptions::default()
        };
        let doc = parse("## Variables\n- **env** (string, required): target\n## Steps\n- Deploy\n  Command: deploy {{env}}\n");
        let graph = convert(&doc, &options).unwrap();
        assert_eq!(graph.steps[0].command, "deploy {{env}}");
        assert_eq!(graph.steps[0].bindings, vec!["env".to_string()]);
    }

    #[test]
    fn test_id_prefix_and_explicit_ids() {
        let options = ConversionOptions {
            id_prefix: "wf-".into(),
            ..ConversionOptions::default()
        };
        let doc = parse("## Steps\n- Build\n  Command: make\n- Ship it\n  Id: ship\n  Command: ship\n  DependsOn: build\n");
        let graph = convert(&doc, &options).unwrap();
        assert_eq!(graph.steps[0].id, "wf-build");
        assert_eq!(graph.steps[1].id, "ship");
        assert_eq!(graph.edges, vec![DependencyEdge::new("ship", "wf-build")]);
    }

    #[test]
    fn test_expired_budget() {
        let options = ConversionOptions {
            time_budget_ms: 1,
            ..ConversionOptions::default()
        };
        let budget = Budget {
            started: Instant::now() - Duration::from_millis(50),
            limit: Budget::new(&options).limit,
        };
        let err = budget.check(ConversionPhase::VariableProcessing).unwrap_err();
        assert_eq!(
            err,
            ConversionError::TimeBudgetExceeded {
                phase: ConversionPhase::VariableProcessing,
                budget_ms: 1
            }
        );
    }

    #[test]
    fn test_long_reverse_chain_converts() {
        let n = 2_000;
        let mut content = String::from("# Chain\n## Steps\n");
        for i in 0..n {
            content.push_str(&format!("- Step {i}\n  Command: run {i}\n"));
            if i + 1 < n {
                content.push_str(&format!("  DependsOn: Step {}\n", i + 1));
            }
        }
        let graph = convert(&parse(&content), &ConversionOptions::default()).unwrap();
        assert_eq!(graph.steps.len(), n);
        assert_eq!(graph.edges.len(), n - 1);
        let order = dag::topological_order(&graph).unwrap();
        assert_eq!(order.first().copied(), Some("step-1999"));
        assert_eq!(order.last().copied(), Some("step-0"));

        let estimate = estimate(&parse(&content));
        assert_eq!(estimate.max_chain_depth, n);
    }

    #[test]
    fn test_graph_metadata_carried_through() {
        let doc = parse("# Workflow: Nightly\n## Metadata\n- Author: ops\n## Steps\n- A\n  Command: a\n");
        let graph = convert(&doc, &ConversionOptions::default()).unwrap();
        assert_eq!(graph.metadata, doc.metadata);
        assert_eq!(graph.content_hash, doc.content_hash);
    }
}
