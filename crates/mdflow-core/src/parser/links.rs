//! Cross-document link checks.

use std::path::Path;
use std::sync::LazyLock;

use mdflow_types::document::Step;
use mdflow_types::error::{ParseError, ParseErrorKind};
use regex::Regex;

use super::ParseContext;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]\((?P<target>[^)\s#]+\.(?:md|markdown))(?:#[^)]*)?\)").expect("valid regex")
});

fn is_document_target(target: &str) -> bool {
    !target.contains("://")
        && Path::new(target)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

fn check_target(
    base: &Path,
    target: &str,
    line: usize,
    excerpt: &str,
    ctx: &mut ParseContext<'_>,
) -> Result<(), ParseError> {
    if !is_document_target(target) || base.join(target).exists() {
        return Ok(());
    }
    ctx.recoverable(
        ParseError::new(ParseErrorKind::BrokenLink(target.to_string())).at_line(line, excerpt),
    )
}

/// Check that linked documents and sub-workflow targets exist next to `source`.
pub(crate) fn check(
    content: &str,
    steps: &[Step],
    source: &Path,
    ctx: &mut ParseContext<'_>,
) -> Result<(), ParseError> {
    let base = source.parent().unwrap_or(Path::new("."));
    for (idx, text) in content.lines().enumerate() {
        for caps in LINK.captures_iter(text) {
            check_target(base, &caps["target"], idx + 1, text, ctx)?;
        }
    }
    for step in steps {
        if let Some(target) = &step.sub_workflow {
            check_target(base, target, step.line, &step.name, ctx)?;
        }
    }
    Ok(())
}
