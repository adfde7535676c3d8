//! Step item parsing.
//!
//! A step is either a bullet item in the Steps section (first line is the
//! title, indented lines are key lines) or an H3+ heading inside Steps whose
//! following blocks carry the key lines. Both shapes end up as a flat list of
//! `SourceLine`s handed to [`apply_key_lines`].

use std::sync::LazyLock;

use mdflow_types::document::{DependencyRef, Step, StepKind};
use mdflow_types::error::{ParseError, ParseErrorKind};
use regex::Regex;

use super::ParseContext;
use super::blocks::{ListItem, SourceLine};
use super::keywords::{self, StepKey};
use crate::placeholder;

static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*{0,2}(?P<key>\p{L}[\p{L}\d _\-]*?)\*{0,2}\s*:\s*(?:\*{2}\s*)?(?P<value>.*)$")
        .expect("valid regex")
});

static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^`?(?P<key>[^\s:=`][^:=`]*?)`?\s*[:=]\s*(?P<value>.*)$").expect("valid regex")
});

static ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:#|step\s*|шаг\s*)?(?P<n>\d+)$").expect("valid regex")
});

static TITLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:step|шаг)\s*\d+\s*[:.)\-]?\s*|\d+[.)]\s+)").expect("valid regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<n>\d+)\s*(?P<unit>ms|s|sec|secs|seconds?|m|min|mins|minutes?|h|hours?|d|days?)?$")
        .expect("valid regex")
});

const NO_DEPENDENCIES: &[&str] = &["none", "нет", "-", "—", "n/a"];

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

fn strip_list_marker(text: &str) -> &str {
    let trimmed = text.trim_start();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    trimmed
}

fn strip_backticks(text: &str) -> &str {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') && !text.starts_with("```") {
        return text[1..text.len() - 1].trim();
    }
    text
}

/// Clean a step title: drop bold markers, `Step 3:` prefixes and list numbering.
pub(crate) fn clean_title(text: &str) -> String {
    let text = text.trim().trim_matches('*').trim();
    let stripped = TITLE_PREFIX.replace(text, "");
    let cleaned = stripped.trim().trim_matches('*').trim_end_matches(':').trim();
    // A bare "Step 2" heading keeps its text as the name.
    if cleaned.is_empty() {
        text.trim_end_matches(':').trim().to_string()
    } else {
        cleaned.to_string()
    }
}

/// Split a `key: value` line. Returns `None` for free text.
pub(crate) fn split_key_line(text: &str) -> Option<(StepKey, String)> {
    let caps = KEY_LINE.captures(strip_list_marker(text))?;
    let key = keywords::step_key(&caps["key"])?;
    Some((key, caps["value"].trim().to_string()))
}

pub(crate) fn parse_dependencies(value: &str) -> Vec<DependencyRef> {
    let normalized = keywords::normalize_keyword(value);
    if normalized.is_empty() || NO_DEPENDENCIES.contains(&normalized.as_str()) {
        return Vec::new();
    }
    value
        .split([',', ';'])
        .map(|part| part.trim().trim_matches('*').trim_matches('`').trim())
        .filter(|part| {
            !part.is_empty() && !NO_DEPENDENCIES.contains(&part.to_lowercase().as_str())
        })
        .map(|part| match ORDINAL.captures(part).and_then(|c| c["n"].parse().ok()) {
            Some(n) => DependencyRef::Ordinal(n),
            None => DependencyRef::Id(part.to_string()),
        })
        .collect()
}

/// Parse a timeout like `30s`, `5m`, `1h`, `250ms`, or bare seconds.
pub(crate) fn parse_timeout(value: &str) -> Option<u64> {
    let caps = DURATION.captures(strip_backticks(value))?;
    let n: u64 = caps["n"].parse().ok()?;
    let unit = caps
        .name("unit")
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let secs = match unit.as_str() {
        "ms" => n.div_ceil(1000),
        "" | "s" | "sec" | "secs" | "second" | "seconds" => n,
        "m" | "min" | "mins" | "minute" | "minutes" => n.checked_mul(60)?,
        "h" | "hour" | "hours" => n.checked_mul(3_600)?,
        _ => n.checked_mul(86_400)?,
    };
    Some(secs)
}

fn parse_parameter(text: &str) -> Option<(String, String)> {
    let caps = PARAMETER.captures(strip_list_marker(text))?;
    Some((
        caps["key"].trim().to_string(),
        strip_backticks(&caps["value"]).to_string(),
    ))
}

fn malformed(step: &Step, line: &SourceLine, reason: String) -> ParseError {
    ParseError::new(ParseErrorKind::MalformedStep(format!(
        "step '{}': {reason}",
        step.name
    )))
    .at_line(line.number, &line.text)
}

// ---------------------------------------------------------------------------
// Key line application
// ---------------------------------------------------------------------------

/// Apply recognised key lines to `step`. Unknown keys and free text are ignored.
///
/// `Parameters:` and an empty `Command:` consume the deeper-indented lines
/// that follow them.
pub(crate) fn apply_key_lines(
    step: &mut Step,
    lines: &[SourceLine],
    ctx: &mut ParseContext<'_>,
) -> Result<(), ParseError> {
    let mut explicit_kind = false;
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        i += 1;
        let Some((key, value)) = split_key_line(&line.text) else {
            continue;
        };

        // Lines indented under this one.
        let block_end = lines[i..]
            .iter()
            .position(|l| l.indent <= line.indent)
            .map_or(lines.len(), |offset| i + offset);
        let block = &lines[i..block_end];

        match key {
            StepKey::Id => {
                let id = strip_backticks(&value);
                if !id.is_empty() {
                    step.id = Some(id.to_string());
                }
            }
            StepKey::Type => match keywords::step_kind(&value) {
                Some(kind) => {
                    step.kind = kind;
                    explicit_kind = true;
                }
                None => {
                    ctx.recoverable(malformed(
                        step,
                        line,
                        format!("unknown step type '{}'", value.trim()),
                    ))?;
                }
            },
            StepKey::Command => {
                if value.is_empty() {
                    step.command = block
                        .iter()
                        .map(|l| l.text.as_str())
                        .filter(|t| !t.starts_with("```") && !t.starts_with("~~~"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    i = block_end;
                } else {
                    step.command = strip_backticks(&value).to_string();
                }
            }
            StepKey::DependsOn => step.depends_on.extend(parse_dependencies(&value)),
            StepKey::Parameters => {
                if !value.is_empty() {
                    for pair in value.split(',') {
                        match parse_parameter(pair) {
                            Some((k, v)) => {
                                step.parameters.insert(k, v);
                            }
                            None => ctx.warn(
                                Some(line.number),
                                format!("step '{}': ignoring parameter '{}'", step.name, pair.trim()),
                            ),
                        }
                    }
                }
                for param_line in block {
                    match parse_parameter(&param_line.text) {
                        Some((k, v)) => {
                            step.parameters.insert(k, v);
                        }
                        None => ctx.warn(
                            Some(param_line.number),
                            format!(
                                "step '{}': ignoring parameter line '{}'",
                                step.name, param_line.text
                            ),
                        ),
                    }
                }
                i = block_end;
            }
            StepKey::Condition => {
                if !value.is_empty() {
                    step.condition = Some(strip_backticks(&value).to_string());
                }
            }
            StepKey::Timeout => match parse_timeout(&value) {
                Some(secs) => step.timeout_secs = Some(secs),
                None => {
                    ctx.recoverable(malformed(step, line, format!("invalid timeout '{value}'")))?;
                }
            },
            StepKey::Retryable => match keywords::boolean(&value) {
                Some(flag) => step.retryable = flag,
                None => {
                    ctx.recoverable(malformed(
                        step,
                        line,
                        format!("invalid retryable flag '{value}'"),
                    ))?;
                }
            },
            StepKey::Description => {
                if !value.is_empty() {
                    step.description = Some(value);
                }
            }
            StepKey::Workflow => {
                let target = strip_backticks(&value);
                if !target.is_empty() {
                    step.sub_workflow = Some(target.to_string());
                    if !explicit_kind && step.kind == StepKind::Task {
                        step.kind = StepKind::SubWorkflow;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Fill an empty command from a fenced code block that follows a heading step.
pub(crate) fn fill_command(step: &mut Step, body: &str) {
    if step.command.is_empty() {
        step.command = body.trim().to_string();
    }
}

/// Check placeholder syntax in a step's command and parameter values.
pub(crate) fn check_placeholders(step: &Step, ctx: &mut ParseContext<'_>) -> Result<(), ParseError> {
    let texts = std::iter::once(&step.command).chain(step.parameters.values());
    for text in texts {
        if let Some(reason) = placeholder::malformed(text) {
            ctx.recoverable(
                ParseError::new(ParseErrorKind::MalformedStep(format!(
                    "step '{}': {reason}",
                    step.name
                )))
                .at_line(step.line, &step.name),
            )?;
        }
    }
    Ok(())
}

/// Parse a Steps-section list where every item is one step.
pub(crate) fn parse_items(
    items: &[ListItem],
    ctx: &mut ParseContext<'_>,
    out: &mut Vec<Step>,
) -> Result<(), ParseError> {
    for item in items {
        ctx.deadline.check()?;
        let mut step = Step::named(clean_title(&item.text), out.len() + 1);
        step.line = item.line;
        apply_key_lines(&mut step, &item.children, ctx)?;
        out.push(step);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdflow_types::config::ParseOptions;

    use crate::parser::blocks::Deadline;

    fn lines(text: &str) -> Vec<SourceLine> {
        text.lines()
            .enumerate()
            .map(|(i, raw)| SourceLine {
                number: i + 1,
                indent: raw.len() - raw.trim_start().len(),
                text: raw.trim().to_string(),
            })
            .collect()
    }

    fn apply(text: &str, options: &ParseOptions) -> (Step, Vec<String>) {
        let mut ctx = ParseContext::new(options, Deadline::unbounded());
        let mut step = Step::named("Build", 1);
        apply_key_lines(&mut step, &lines(text), &mut ctx).unwrap();
        let warnings = ctx.warnings.iter().map(|w| w.message.clone()).collect();
        (step, warnings)
    }

    #[test]
    fn test_core_key_lines() {
        let (step, warnings) = apply(
            "Type: Task\nCommand: `cargo build --release`\nDependsOn: Fetch, #2\nParameters:\n  target: x86_64\n  - jobs=4\n",
            &ParseOptions::default(),
        );
        assert!(warnings.is_empty());
        assert_eq!(step.kind, StepKind::Task);
        assert_eq!(step.command, "cargo build --release");
        assert_eq!(
            step.depends_on,
            vec![DependencyRef::Id("Fetch".into()), DependencyRef::Ordinal(2)]
        );
        assert_eq!(step.parameters.get("target").map(String::as_str), Some("x86_64"));
        assert_eq!(step.parameters.get("jobs").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_extended_key_lines() {
        let (step, _) = apply(
            "**Id:** build-main\nCondition: env == prod\nTimeout: 5m\nRetryable: yes\nDescription: compile it\n",
            &ParseOptions::default(),
        );
        assert_eq!(step.id.as_deref(), Some("build-main"));
        assert_eq!(step.condition.as_deref(), Some("env == prod"));
        assert_eq!(step.timeout_secs, Some(300));
        assert!(step.retryable);
        assert_eq!(step.description.as_deref(), Some("compile it"));
    }

    #[test]
    fn test_multiline_command_block() {
        let (step, _) = apply(
            "Command:\n  ```bash\n  make\n  make install\n  ```\nType: Task\n",
            &ParseOptions::default(),
        );
        assert_eq!(step.command, "make\nmake install");
    }

    #[test]
    fn test_workflow_key_implies_subworkflow() {
        let (step, _) = apply("Workflow: release.md\n", &ParseOptions::default());
        assert_eq!(step.kind, StepKind::SubWorkflow);
        assert_eq!(step.sub_workflow.as_deref(), Some("release.md"));
    }

    #[test]
    fn test_unknown_type_warns_unless_strict() {
        let (step, warnings) = apply("Type: Teleport\n", &ParseOptions::default());
        assert_eq!(step.kind, StepKind::Task);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Teleport"));

        let options = ParseOptions::strict();
        let mut ctx = ParseContext::new(&options, Deadline::unbounded());
        let mut step = Step::named("Build", 1);
        let err = apply_key_lines(&mut step, &lines("Type: Teleport"), &mut ctx).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::MalformedStep(_)));
        assert_eq!(err.location.line, Some(1));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let (step, warnings) = apply("Owner: ops\nJust some prose.\n", &ParseOptions::default());
        assert!(warnings.is_empty());
        assert_eq!(step, Step::named("Build", 1));
    }

    #[test]
    fn test_parse_dependencies_forms() {
        assert!(parse_dependencies("none").is_empty());
        assert!(parse_dependencies("").is_empty());
        assert_eq!(
            parse_dependencies("Step 1; `lint`, шаг 3"),
            vec![
                DependencyRef::Ordinal(1),
                DependencyRef::Id("lint".into()),
                DependencyRef::Ordinal(3)
            ]
        );
    }

    #[test]
    fn test_parse_timeout_units() {
        assert_eq!(parse_timeout("30"), Some(30));
        assert_eq!(parse_timeout("30s"), Some(30));
        assert_eq!(parse_timeout("2 min"), Some(120));
        assert_eq!(parse_timeout("1h"), Some(3_600));
        assert_eq!(parse_timeout("1500ms"), Some(2));
        assert_eq!(parse_timeout("soon"), None);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("**Build**"), "Build");
        assert_eq!(clean_title("Step 2: Deploy"), "Deploy");
        assert_eq!(clean_title("Шаг 1. Сборка"), "Сборка");
        assert_eq!(clean_title("3. Test"), "Test");
        assert_eq!(clean_title("Step 2"), "Step 2");
    }

    #[test]
    fn test_split_key_line() {
        assert_eq!(split_key_line("Type: Task"), Some((StepKey::Type, "Task".to_string())));
        assert!(split_key_line("- **Command:** make").is_some());
        assert!(split_key_line("Build the project").is_none());
    }
}
