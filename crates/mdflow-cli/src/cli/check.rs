//! `mdflow check`: parse, validate, and estimate one document.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use mdflow_core::Parser;
use mdflow_core::converter::complexity;
use mdflow_core::validator::validate_with;
use mdflow_infra::hash::Sha256ContentHasher;
use mdflow_types::config::MdflowConfig;
use mdflow_types::validation::{Severity, ValidationIssue, ValidationReport};

pub fn run(config: &MdflowConfig, file: &Path, strict: bool, json: bool) -> Result<()> {
    let mut options = config.parser.clone();
    options.strict |= strict;
    let parser = Parser::new(Arc::new(Sha256ContentHasher::new())).with_options(options);

    let doc = parser
        .parse_file(file)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let report = validate_with(&doc, &config.converter.required_sections);
    let estimate = complexity::estimate(&doc);

    if json {
        let out = serde_json::json!({
            "path": file.display().to_string(),
            "title": doc.metadata.title,
            "content_hash": doc.content_hash,
            "steps": doc.steps.len(),
            "variables": doc.variables.len(),
            "parse_warnings": doc.warnings,
            "validation": report,
            "complexity": estimate,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} {}",
            style("Workflow:").bold(),
            style(if doc.metadata.title.is_empty() { "(untitled)" } else { doc.metadata.title.as_str() }).cyan()
        );
        println!("  Steps: {}  Variables: {}", doc.steps.len(), doc.variables.len());
        println!(
            "  Complexity: {:.1}/10 (chain depth {}, ~{} ms)",
            estimate.score, estimate.max_chain_depth, estimate.estimated_time_ms
        );
        for warning in &doc.warnings {
            let line = warning.line.map(|l| format!("line {l}: ")).unwrap_or_default();
            println!("  {} {line}{}", style("parse warning").yellow(), warning.message);
        }
        if report.errors.is_empty() && report.warnings.is_empty() {
            println!("  {} no validation issues", style("*").green().bold());
        } else {
            println!("{}", issue_table(&report));
        }
        println!();
    }

    if !report.is_valid() {
        bail!("{} validation error(s) in {}", report.errors.len(), file.display());
    }
    Ok(())
}

fn issue_table(report: &ValidationReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Severity").fg(Color::Cyan),
            Cell::new("Code"),
            Cell::new("Subject"),
            Cell::new("Message"),
        ]);
    for issue in report.errors.iter().chain(report.warnings.iter()) {
        table.add_row(vec![
            severity_cell(issue.severity),
            Cell::new(format!("{:?}", issue.code)),
            Cell::new(subject(issue)),
            Cell::new(issue.to_string()),
        ]);
    }
    table
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("error").fg(Color::Red),
        Severity::Warning => Cell::new("warning").fg(Color::Yellow),
    }
}

fn subject(issue: &ValidationIssue) -> String {
    match (&issue.step, &issue.variable) {
        (Some(step), _) => format!("step {step}"),
        (None, Some(variable)) => format!("variable {variable}"),
        (None, None) => "-".to_string(),
    }
}
