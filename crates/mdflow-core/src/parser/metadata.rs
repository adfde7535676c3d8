//! Metadata section parsing (`key: value` lines).

use std::sync::LazyLock;

use mdflow_types::document::Metadata;
use mdflow_types::error::{ParseError, ParseErrorKind};
use regex::Regex;

use super::ParseContext;
use super::blocks::SourceLine;
use super::keywords::{self, MetadataKey};
use crate::coerce;

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*{0,2}(?P<key>[^:*`]+?)\*{0,2}\s*:\s*(?:\*{2}\s*)?(?P<value>.*)$")
        .expect("valid regex")
});

fn strip_decoration(value: &str) -> &str {
    value.trim().trim_matches('`').trim()
}

/// True when the line looks like `key: value` (list marker allowed).
pub(crate) fn is_key_value(text: &str) -> bool {
    KEY_VALUE.is_match(text.trim_start_matches(['-', '*', '+', ' ']))
}

fn invalid(line: &SourceLine, key: &str, reason: String) -> ParseError {
    ParseError::new(ParseErrorKind::InvalidMetadata {
        key: key.to_string(),
        reason,
    })
    .at_line(line.number, &line.text)
}

/// Apply `key: value` lines to `metadata`. Unknown keys land in `extra`.
///
/// Unrecognised priority, status and date values fail the parse in strict
/// mode and become warnings otherwise.
pub(crate) fn apply_lines(
    metadata: &mut Metadata,
    lines: &[SourceLine],
    ctx: &mut ParseContext<'_>,
) -> Result<(), ParseError> {
    for line in lines {
        let text = line
            .text
            .strip_prefix("- ")
            .or_else(|| line.text.strip_prefix("* "))
            .or_else(|| line.text.strip_prefix("+ "))
            .unwrap_or(&line.text);
        let Some(caps) = KEY_VALUE.captures(text.trim()) else {
            continue;
        };
        let raw_key = caps["key"].trim();
        let value = strip_decoration(&caps["value"]);

        match keywords::metadata_key(raw_key) {
            Some(MetadataKey::Title) => {
                if !value.is_empty() {
                    metadata.title = keywords::strip_title_prefix(value).to_string();
                }
            }
            Some(MetadataKey::Description) => {
                if !value.is_empty() {
                    metadata.description = Some(value.to_string());
                }
            }
            Some(MetadataKey::Author) => {
                if !value.is_empty() {
                    metadata.author = Some(value.to_string());
                }
            }
            Some(MetadataKey::Version) => {
                if !value.is_empty() {
                    metadata.version = Some(value.to_string());
                }
            }
            Some(MetadataKey::Tags) => {
                metadata.tags.extend(
                    value
                        .split([',', ';'])
                        .map(|t| t.trim().trim_start_matches('#').trim_matches('`').to_lowercase())
                        .filter(|t| !t.is_empty()),
                );
            }
            Some(MetadataKey::Priority) => match keywords::priority(value) {
                Some(priority) => metadata.priority = priority,
                None => ctx.recoverable(invalid(line, raw_key, format!("unknown priority '{value}'")))?,
            },
            Some(MetadataKey::Status) => match keywords::status(value) {
                Some(status) => metadata.status = status,
                None => ctx.recoverable(invalid(line, raw_key, format!("unknown status '{value}'")))?,
            },
            Some(MetadataKey::Created) => match coerce::timestamp(value) {
                Some(ts) => metadata.created_at = Some(ts),
                None => ctx.recoverable(invalid(
                    line,
                    raw_key,
                    format!("unparseable creation date '{value}'"),
                ))?,
            },
            Some(MetadataKey::Updated) => match coerce::timestamp(value) {
                Some(ts) => metadata.updated_at = Some(ts),
                None => ctx.recoverable(invalid(
                    line,
                    raw_key,
                    format!("unparseable update date '{value}'"),
                ))?,
            },
            None => {
                metadata
                    .extra
                    .insert(keywords::normalize_keyword(raw_key), value.to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdflow_types::config::ParseOptions;
    use mdflow_types::document::{Priority, WorkflowStatus};

    use crate::parser::blocks::Deadline;

    fn line(number: usize, text: &str) -> SourceLine {
        SourceLine {
            number,
            indent: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_apply_metadata_lines() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options, Deadline::unbounded());
        let mut metadata = Metadata::default();
        let lines = vec![
            line(1, "- **Author:** Ops Team"),
            line(2, "- Version: 1.2.0"),
            line(3, "- Tags: Build, #CI, build"),
            line(4, "- Priority: high"),
            line(5, "- Status: ready"),
            line(6, "- Created: 2024-03-01"),
            line(7, "- Team: platform"),
        ];
        apply_lines(&mut metadata, &lines, &mut ctx).unwrap();
        assert!(ctx.warnings.is_empty());
        assert_eq!(metadata.author.as_deref(), Some("Ops Team"));
        assert_eq!(metadata.version.as_deref(), Some("1.2.0"));
        assert_eq!(metadata.tags.len(), 2);
        assert!(metadata.tags.contains("ci"));
        assert_eq!(metadata.priority, Priority::High);
        assert_eq!(metadata.status, WorkflowStatus::Ready);
        assert!(metadata.created_at.is_some());
        assert_eq!(metadata.extra.get("team").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_unknown_priority_is_warning() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options, Deadline::unbounded());
        let mut metadata = Metadata::default();
        apply_lines(&mut metadata, &[line(3, "Priority: whenever")], &mut ctx).unwrap();
        assert_eq!(metadata.priority, Priority::Normal);
        assert_eq!(ctx.warnings.len(), 1);
        assert_eq!(ctx.warnings[0].line, Some(3));
    }

    #[test]
    fn test_strict_rejects_bad_metadata_values() {
        let options = ParseOptions::strict();
        for text in [
            "- Priority: Bogus",
            "- Status: sideways",
            "- Created: yesterday-ish",
            "- Updated: 2024-13-45",
        ] {
            let mut ctx = ParseContext::new(&options, Deadline::unbounded());
            let mut metadata = Metadata::default();
            let err = apply_lines(&mut metadata, &[line(3, text)], &mut ctx).unwrap_err();
            assert!(
                matches!(err.kind, ParseErrorKind::InvalidMetadata { .. }),
                "{text}: {err:?}"
            );
            assert_eq!(err.location.line, Some(3));
            assert!(ctx.warnings.is_empty());
        }
    }

    #[test]
    fn test_russian_keys() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options, Deadline::unbounded());
        let mut metadata = Metadata::default();
        apply_lines(
            &mut metadata,
            &[line(1, "- Автор: Иван"), line(2, "- Приоритет: критический")],
            &mut ctx,
        )
        .unwrap();
        assert_eq!(metadata.author.as_deref(), Some("Иван"));
        assert_eq!(metadata.priority, Priority::Critical);
    }
}
