//! Step identifier generation and dependency reference lookup.

use std::collections::HashMap;

use mdflow_types::document::DependencyRef;

/// Normalize a title into an identifier: lowercase alphanumerics joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Identifier generated for a step without an explicit one.
pub fn generated_id(prefix: &str, title: &str, position: usize) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{prefix}step-{position}")
    } else {
        format!("{prefix}{slug}")
    }
}

/// Resolves dependency references against a set of steps.
///
/// Lookup order: ordinal position, exact identifier, generated form of the
/// reference, then a slugified title match. The first step registered under
/// a key wins.
#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    prefix: String,
    positions: HashMap<usize, usize>,
    ids: HashMap<String, usize>,
    titles: HashMap<String, usize>,
}

impl ReferenceIndex {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    /// Register the step at `index` under its final id, title, and position.
    pub fn insert(&mut self, index: usize, id: &str, title: &str, position: usize) {
        self.positions.entry(position).or_insert(index);
        self.ids.entry(id.to_string()).or_insert(index);
        let slug = slugify(title);
        if !slug.is_empty() {
            self.titles.entry(slug).or_insert(index);
        }
    }

    pub fn resolve(&self, reference: &DependencyRef) -> Option<usize> {
        match reference {
            DependencyRef::Ordinal(position) => self.positions.get(position).copied(),
            DependencyRef::Id(text) => {
                let text = text.trim();
                if let Some(&index) = self.ids.get(text) {
                    return Some(index);
                }
                let slug = slugify(text);
                if slug.is_empty() {
                    return None;
                }
                self.ids
                    .get(&format!("{}{slug}", self.prefix))
                    .or_else(|| self.titles.get(&slug))
                    .copied()
            }
        }
    }
}
