//! Live set of converted workflows, kept current by watcher callbacks.
//!
//! `LiveWorkflowSet` is the reference consumer of [`WorkflowFileHandler`]:
//! each callback runs the ingestion pipeline and registers, updates, or
//! unregisters the resulting graph by path. Changes are published on a
//! broadcast channel; publishing with no subscribers is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use mdflow_types::graph::WorkflowGraph;
use tokio::sync::broadcast;

use crate::pipeline::IngestionPipeline;
use crate::watch::WorkflowFileHandler;

/// Change notifications for the live set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { path: PathBuf, hash: String },
    Updated { path: PathBuf, hash: String },
    Unregistered { path: PathBuf },
    /// Ingestion failed. A previously registered graph for the path stays live.
    Failed { path: PathBuf, error: String },
}

pub struct LiveWorkflowSet {
    pipeline: Arc<IngestionPipeline>,
    graphs: DashMap<PathBuf, Arc<WorkflowGraph>>,
    failures: DashMap<PathBuf, String>,
    sender: broadcast::Sender<RegistryEvent>,
}

impl LiveWorkflowSet {
    pub fn new(pipeline: Arc<IngestionPipeline>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            pipeline,
            graphs: DashMap::new(),
            failures: DashMap::new(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    pub fn get(&self, path: &Path) -> Option<Arc<WorkflowGraph>> {
        self.graphs.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.graphs.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Latest ingestion failure per path, sorted by path.
    pub fn failures(&self) -> Vec<(PathBuf, String)> {
        let mut failures: Vec<(PathBuf, String)> = self
            .failures
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        failures.sort();
        failures
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    fn publish(&self, event: RegistryEvent) {
        let _ = self.sender.send(event);
    }

    fn ingest(&self, path: &Path, content: &str) {
        match self.pipeline.ingest(Some(path), content) {
            Ok(graph) => {
                self.failures.remove(path);
                let hash = graph.content_hash.clone();
                let previous = self.graphs.insert(path.to_path_buf(), graph);
                let event = match previous {
                    Some(old) if old.content_hash == hash => return,
                    Some(_) => RegistryEvent::Updated {
                        path: path.to_path_buf(),
                        hash,
                    },
                    None => RegistryEvent::Registered {
                        path: path.to_path_buf(),
                        hash,
                    },
                };
                self.publish(event);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "workflow ingestion failed");
                let error = e.to_string();
                self.failures.insert(path.to_path_buf(), error.clone());
                self.publish(RegistryEvent::Failed {
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
}

impl WorkflowFileHandler for LiveWorkflowSet {
    fn on_file_created(&self, path: &Path, content: &str) {
        self.ingest(path, content);
    }

    fn on_file_changed(&self, path: &Path, _previous: &str, current: &str) {
        self.ingest(path, current);
    }

    fn on_file_deleted(&self, path: &Path) {
        self.failures.remove(path);
        self.pipeline.forget(path);
        if self.graphs.remove(path).is_some() {
            tracing::info!(path = %path.display(), "workflow unregistered");
            self.publish(RegistryEvent::Unregistered {
                path: path.to_path_buf(),
            });
        }
    }
}

impl std::fmt::Debug for LiveWorkflowSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveWorkflowSet")
            .field("graphs", &self.graphs.len())
            .field("failures", &self.failures.len())
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::testing;

    const FLOW: &str = "# Release\n\n## Steps\n- Build\n  Command: make\n- Deploy\n  DependsOn: Build\n";

    fn live() -> LiveWorkflowSet {
        LiveWorkflowSet::new(Arc::new(IngestionPipeline::new(testing::hasher())), 16)
    }

    #[tokio::test]
    async fn test_create_change_delete_lifecycle() {
        let set = live();
        let mut rx = set.subscribe();
        let path = Path::new("flows/release.md");

        set.on_file_created(path, FLOW);
        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Registered { .. }));
        let graph = set.get(path).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, "deploy");
        assert_eq!(graph.edges[0].to, "build");

        let edited = FLOW.replace("make", "make all");
        set.on_file_changed(path, FLOW, &edited);
        assert!(matches!(rx.recv().await.unwrap(), RegistryEvent::Updated { .. }));
        assert_eq!(set.get(path).unwrap().steps[0].command, "make all");

        set.on_file_deleted(path);
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Unregistered {
                path: path.to_path_buf()
            }
        );
        assert!(set.is_empty());
        assert!(set.pipeline().cache().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_graph() {
        let set = live();
        let path = Path::new("flows/release.md");
        set.on_file_created(path, FLOW);
        let mut rx = set.subscribe();

        let broken = "## Steps\n- A\n  DependsOn: B\n- B\n  DependsOn: A\n";
        set.on_file_changed(path, FLOW, broken);
        match rx.recv().await.unwrap() {
            RegistryEvent::Failed { error, .. } => assert!(error.contains("cycle")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(set.get(path).is_some());
        assert_eq!(set.failures().len(), 1);

        set.on_file_changed(path, broken, FLOW);
        assert!(set.failures().is_empty());
    }

    #[test]
    fn test_paths_sorted() {
        let set = live();
        set.on_file_created(Path::new("b.md"), FLOW);
        set.on_file_created(Path::new("a.md"), "# A\n\n## Steps\n- Only\n  Command: true\n");
        assert_eq!(set.paths(), vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_delete_unknown_path_is_noop() {
        let set = live();
        let mut rx = set.subscribe();
        set.on_file_deleted(Path::new("never.md"));
        assert!(rx.try_recv().is_err());
    }
}
