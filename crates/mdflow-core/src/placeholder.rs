//! `{{name}}` placeholder scanning and rewriting.
//!
//! The converter never evaluates values. It only rewrites tokens that name a
//! declared variable into the executor's binding syntax,
//! `{{ variables.<name> }}`, and reports the rest.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?P<name>[A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("valid regex")
});

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid regex"));

/// Namespace the executor resolves bindings from.
pub const BINDING_NAMESPACE: &str = "variables";

/// Result of rewriting one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// Declared variables referenced by the text, in order of first use.
    pub bound: Vec<String>,
    /// Placeholder names with no matching declaration.
    pub undeclared: Vec<String>,
}

/// Variable name a token refers to. Already-rewritten bindings are accepted.
fn variable_name<'a>(caps: &'a Captures<'_>) -> &'a str {
    let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
    name.strip_prefix(BINDING_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// Format the binding expression for a variable.
pub fn binding(name: &str) -> String {
    format!("{{{{ {BINDING_NAMESPACE}.{name} }}}}")
}

/// Rewrite every placeholder naming a declared variable into binding syntax.
///
/// With `substitute` off the text is returned untouched but the references
/// are still classified, so callers can record deferred bindings.
pub fn rewrite(text: &str, substitute: bool, is_declared: impl Fn(&str) -> bool) -> Rewrite {
    let mut result = Rewrite::default();
    let rewritten = TOKEN.replace_all(text, |caps: &Captures<'_>| {
        let name = variable_name(caps);
        if is_declared(name) {
            push_unique(&mut result.bound, name);
            if substitute {
                return binding(name);
            }
        } else {
            push_unique(&mut result.undeclared, name);
        }
        caps[0].to_string()
    });
    result.text = rewritten.into_owned();
    result
}

/// Describe the first malformed `{{...}}` token in `text`, if any.
pub fn malformed(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Some("unterminated placeholder '{{'".to_string());
        };
        let inner = after[..close].trim();
        if !NAME.is_match(inner) {
            return Some(format!("invalid placeholder name '{inner}'"));
        }
        rest = &after[close + 2..];
    }
    None
}
