//! Content-hash keyed ingestion cache.
//!
//! One process-wide map from content hash to converted graph. Entries are
//! written once per successful conversion and never mutated; an edited file
//! hashes differently and gets a new entry. A second index remembers which
//! hash each watched path currently holds, so entries for replaced or
//! deleted files can be evicted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use mdflow_types::graph::WorkflowGraph;

#[derive(Debug, Default)]
pub struct IngestionCache {
    entries: DashMap<String, Arc<WorkflowGraph>>,
    paths: DashMap<PathBuf, String>,
}

impl IngestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<Arc<WorkflowGraph>> {
        self.entries.get(hash).map(|entry| Arc::clone(entry.value()))
    }

    /// Store a converted graph under its content hash.
    ///
    /// If an entry already exists it is kept and returned instead, so every
    /// caller observes the same instance for the same content.
    pub fn insert(&self, graph: WorkflowGraph) -> Arc<WorkflowGraph> {
        let hash = graph.content_hash.clone();
        let entry = self.entries.entry(hash).or_insert_with(|| Arc::new(graph));
        Arc::clone(entry.value())
    }

    /// Record that `path` now holds content with `hash`.
    pub fn associate(&self, path: &Path, hash: &str) {
        let previous = self.paths.insert(path.to_path_buf(), hash.to_string());
        if let Some(previous) = previous.filter(|p| p != hash) {
            self.evict_if_unreferenced(&previous);
        }
    }

    /// Hash currently associated with `path`.
    pub fn hash_for(&self, path: &Path) -> Option<String> {
        self.paths.get(path).map(|entry| entry.value().clone())
    }

    /// Drop the association for `path`, evicting its entry if no other path uses it.
    pub fn forget_path(&self, path: &Path) -> Option<String> {
        let (_, hash) = self.paths.remove(path)?;
        self.evict_if_unreferenced(&hash);
        Some(hash)
    }

    fn evict_if_unreferenced(&self, hash: &str) {
        let referenced = self.paths.iter().any(|entry| entry.value() == hash);
        if !referenced && self.entries.remove(hash).is_some() {
            tracing::debug!(hash = %hash, "evicted cache entry");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdflow_types::document::Metadata;

    fn graph(hash: &str) -> WorkflowGraph {
        WorkflowGraph {
            content_hash: hash.to_string(),
            source: None,
            metadata: Metadata::default(),
            variables: vec![],
            steps: vec![],
            edges: vec![],
            warnings: vec![],
            converted_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_is_write_once() {
        let cache = IngestionCache::new();
        let first = cache.insert(graph("h1"));
        let second = cache.insert(graph("h1"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get("h1").unwrap(), &first));
    }

    #[test]
    fn test_reassociation_evicts_old_hash() {
        let cache = IngestionCache::new();
        let path = Path::new("flows/a.md");
        cache.insert(graph("old"));
        cache.associate(path, "old");
        cache.insert(graph("new"));
        cache.associate(path, "new");
        assert!(cache.get("old").is_none());
        assert!(cache.get("new").is_some());
        assert_eq!(cache.hash_for(path).as_deref(), Some("new"));
    }

    #[test]
    fn test_shared_hash_survives_one_path_leaving() {
        let cache = IngestionCache::new();
        cache.insert(graph("same"));
        cache.associate(Path::new("a.md"), "same");
        cache.associate(Path::new("b.md"), "same");
        assert_eq!(cache.forget_path(Path::new("a.md")).as_deref(), Some("same"));
        assert!(cache.get("same").is_some());
        cache.forget_path(Path::new("b.md"));
        assert!(cache.get("same").is_none());
    }
}
