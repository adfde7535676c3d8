//! Variable declaration parsing.
//!
//! Grammar (one list item per declaration):
//!
//! ```text
//! **name** (type, required|optional[, default: value][, values: a|b|c]): description
//! ```
//!
//! The regex only finds the bold name; the parenthesised part is split by a
//! small bracket-aware scanner and fed into `VariableBuilder`, which rejects
//! any declaration missing its type or its required/optional flag instead of
//! defaulting them.

use std::sync::LazyLock;

use mdflow_types::document::{Variable, VariableKind, VariableValue};
use mdflow_types::error::{ParseError, ParseErrorKind};
use regex::Regex;

use super::ParseContext;
use super::blocks::ListItem;
use super::keywords::{self, Requirement, VariableAttribute};
use crate::coerce;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*\s*`?(?P<name>[^*`]+?)`?\s*\*\*\s*(?P<rest>.*)$").expect("valid regex")
});

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[\p{L} ]+?)\s*[:=]\s*(?P<value>.*)$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects the pieces of one declaration and validates completeness.
#[derive(Debug, Default)]
struct VariableBuilder {
    name: Option<String>,
    kind: Option<VariableKind>,
    requirement: Option<Requirement>,
    default: Option<String>,
    allowed_values: Vec<String>,
    description: String,
    line: usize,
}

/// A complete declaration whose default has not been coerced yet.
#[derive(Debug)]
struct Declaration {
    variable: Variable,
    raw_default: Option<String>,
}

impl VariableBuilder {
    fn new(line: usize) -> Self {
        Self {
            line,
            ..Self::default()
        }
    }

    fn name(&mut self, name: &str) -> Result<&mut Self, String> {
        let name = name.trim();
        if !NAME.is_match(name) {
            return Err(format!("'{name}' is not a valid variable name"));
        }
        self.name = Some(name.to_string());
        Ok(self)
    }

    fn kind(&mut self, word: &str) -> Result<&mut Self, String> {
        let kind = keywords::variable_kind(word)
            .ok_or_else(|| format!("unknown variable type '{}'", word.trim()))?;
        self.kind = Some(kind);
        Ok(self)
    }

    fn requirement(&mut self, word: &str) -> Result<&mut Self, String> {
        let requirement = keywords::requirement(word).ok_or_else(|| {
            format!("expected 'required' or 'optional', found '{}'", word.trim())
        })?;
        self.requirement = Some(requirement);
        Ok(self)
    }

    fn attribute(&mut self, attribute: VariableAttribute, value: &str) -> &mut Self {
        match attribute {
            VariableAttribute::Default => self.default = Some(value.trim().to_string()),
            VariableAttribute::Values => {
                self.allowed_values = value
                    .split(['|', ';'])
                    .map(|v| v.trim().trim_matches('`').to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
            }
        }
        self
    }

    fn description(&mut self, text: &str) -> &mut Self {
        self.description = text.trim().to_string();
        self
    }

    fn build(self) -> Result<Declaration, String> {
        let name = self.name.ok_or("missing variable name")?;
        let kind = self
            .kind
            .ok_or_else(|| format!("variable '{name}' is missing its type"))?;
        let requirement = self
            .requirement
            .ok_or_else(|| format!("variable '{name}' is missing required/optional"))?;
        Ok(Declaration {
            variable: Variable {
                name,
                kind,
                required: requirement == Requirement::Required,
                default: None,
                description: self.description,
                allowed_values: self.allowed_values,
                line: self.line,
            },
            raw_default: self.default.filter(|d| !d.is_empty()),
        })
    }
}

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

/// Split `(inner) after` into `(inner, after)`, honouring nested brackets and quotes.
fn split_parenthesized(text: &str) -> Result<(&str, &str), String> {
    let text = text.trim_start();
    if !text.starts_with('(') {
        return Err("expected '(type, required|optional)' after the variable name".to_string());
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if c != ')' {
                        return Err(format!("unexpected '{c}' in declaration"));
                    }
                    return Ok((&text[1..i], &text[i + 1..]));
                }
            }
            _ => {}
        }
    }
    Err("unbalanced parentheses in declaration".to_string())
}

/// Split on commas that are not inside brackets or quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn parse_declaration(text: &str, line: usize) -> Result<Declaration, String> {
    let caps = DECLARATION
        .captures(text.trim())
        .ok_or("expected '**name** (type, required|optional): description'")?;
    let mut builder = VariableBuilder::new(line);
    builder.name(&caps["name"])?;

    let (inner, after) = split_parenthesized(&caps["rest"])?;
    let parts = split_top_level(inner);
    let mut parts = parts.into_iter();
    builder.kind(parts.next().unwrap_or_default())?;
    builder.requirement(parts.next().unwrap_or_default())?;

    // A segment without a known `key:` prefix continues the previous
    // attribute, so `default: a, b` stays one value.
    let mut current: Option<(VariableAttribute, String)> = None;
    for part in parts {
        let attribute = ATTRIBUTE.captures(part).and_then(|c| {
            keywords::variable_attribute(&c["key"]).map(|a| (a, c["value"].to_string()))
        });
        match (attribute, current.as_mut()) {
            (Some(next), _) => {
                if let Some((attr, value)) = current.replace(next) {
                    builder.attribute(attr, &value);
                }
            }
            (None, Some((_, value))) => {
                value.push_str(", ");
                value.push_str(part);
            }
            (None, None) => return Err(format!("unexpected '{part}' in declaration")),
        }
    }
    if let Some((attr, value)) = current {
        builder.attribute(attr, &value);
    }

    let after = after.trim();
    let description = if let Some(rest) = after.strip_prefix(':') {
        rest
    } else if let Some(rest) = after.strip_prefix('-') {
        rest
    } else if after.is_empty() {
        ""
    } else {
        return Err(format!("expected ':' before the description, found '{after}'"));
    };
    builder.description(description);
    builder.build()
}

// ---------------------------------------------------------------------------
// Section entry point
// ---------------------------------------------------------------------------

/// Parse the list items of a Variables section.
pub(crate) fn parse_items(
    items: &[ListItem],
    ctx: &mut ParseContext<'_>,
    out: &mut Vec<Variable>,
) -> Result<(), ParseError> {
    for item in items {
        ctx.deadline.check()?;
        let mut declaration = match parse_declaration(&item.text, item.line) {
            Ok(d) => d,
            Err(reason) => {
                ctx.recoverable(
                    ParseError::new(ParseErrorKind::MalformedVariable(reason))
                        .at_line(item.line, &item.text),
                )?;
                continue;
            }
        };

        // Indented lines under a declaration extend its description.
        for child in &item.children {
            if !declaration.variable.description.is_empty() {
                declaration.variable.description.push(' ');
            }
            declaration.variable.description.push_str(child.text.trim());
        }

        if let Some(raw) = declaration.raw_default.take() {
            let variable = &mut declaration.variable;
            variable.default = match coerce::coerce(&raw, variable.kind) {
                Ok(value) => Some(value),
                Err(reason) => {
                    ctx.recoverable(
                        ParseError::new(ParseErrorKind::InvalidValue {
                            variable: variable.name.clone(),
                            reason,
                        })
                        .at_line(item.line, &item.text),
                    )?;
                    Some(VariableValue::Text(raw))
                }
            };
        }
        out.push(declaration.variable);
    }
    Ok(())
}
