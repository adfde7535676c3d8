//! End-to-end ingestion: SHA-256 hashing, parse/convert pipeline, cache,
//! live workflow set, and the filesystem watcher.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use mdflow_core::registry::{LiveWorkflowSet, RegistryEvent};
use mdflow_core::{IngestError, IngestionPipeline, dag};
use mdflow_infra::hash::Sha256ContentHasher;
use mdflow_infra::watcher::{WatcherState, WorkflowWatcher};
use mdflow_types::document::{VariableKind, VariableValue};
use mdflow_types::error::ConversionError;

const RELEASE: &str = "\
# Workflow: Release

## Metadata
- Author: ops
- Version: 1.4.0
- Tags: release, ci

## Variables
- **count** (number, optional, default: 3): retries
- **target** (string, required): deployment target

## Steps

### Build
Command: dotnet build

### Test
DependsOn: Build
Command: dotnet test --retries {{count}}

### Deploy
DependsOn: Test, 1
Command: deploy --to {{target}}
";

fn pipeline() -> Arc<IngestionPipeline> {
    Arc::new(IngestionPipeline::new(Arc::new(Sha256ContentHasher::new())))
}

async fn next(events: &mut broadcast::Receiver<RegistryEvent>) -> RegistryEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("registry event within timeout")
        .expect("registry channel open")
}

#[test]
fn converts_release_document_with_sha256_cache_key() {
    let pipeline = pipeline();
    let graph = pipeline.ingest(Some(Path::new("release.md")), RELEASE).unwrap();

    assert_eq!(graph.content_hash.len(), 64);
    assert_eq!(graph.metadata.title, "Release");
    assert_eq!(graph.steps.len(), 3);
    assert_eq!(graph.variables[0].kind, VariableKind::Number);
    assert_eq!(graph.variables[0].default, Some(VariableValue::Number(3.0)));

    let deploy = graph.step("deploy").unwrap();
    assert_eq!(deploy.depends_on, vec!["test".to_string(), "build".to_string()]);
    assert_eq!(deploy.bindings, vec!["target".to_string()]);
    assert_eq!(deploy.command, "deploy --to {{ variables.target }}");

    let order = dag::topological_order(&graph).unwrap();
    assert_eq!(order, vec!["build", "test", "deploy"]);

    let again = pipeline.ingest(Some(Path::new("release.md")), RELEASE).unwrap();
    assert!(Arc::ptr_eq(&graph, &again));
    assert_eq!(pipeline.stats().parses, 1);
}

#[test]
fn manufactured_cycle_names_both_steps() {
    let content = "# Loop\n\n## Steps\n- Build\n  DependsOn: Deploy\n- Deploy\n  DependsOn: Build\n";
    match pipeline().ingest(None, content) {
        Err(IngestError::Conversion(ConversionError::Cycle { path })) => {
            assert!(path.iter().any(|s| s == "build"));
            assert!(path.iter().any(|s| s == "deploy"));
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[tokio::test]
async fn watcher_drives_live_workflow_set() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("release.md"), RELEASE).await.unwrap();
    tokio::fs::write(dir.path().join("README.md"), "Just notes.\n").await.unwrap();

    let live = Arc::new(LiveWorkflowSet::new(pipeline(), 64));
    let mut events = live.subscribe();
    let mut watcher = WorkflowWatcher::new(live.clone(), Duration::from_millis(100));
    assert_eq!(watcher.start(dir.path(), true).await.unwrap(), 1);
    assert_eq!(watcher.state(), WatcherState::Watching);

    assert!(matches!(next(&mut events).await, RegistryEvent::Registered { .. }));
    assert_eq!(live.len(), 1);

    let extra = RELEASE.replace("# Workflow: Release", "# Workflow: Hotfix");
    tokio::fs::write(dir.path().join("hotfix.md"), &extra).await.unwrap();

    // Native event delivery is platform dependent; only assert on what arrives.
    match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Ok(RegistryEvent::Registered { path, .. })) => {
            assert!(path.ends_with("hotfix.md"));
            assert_eq!(live.len(), 2);
        }
        Ok(other) => panic!("unexpected registry event: {other:?}"),
        Err(_) => eprintln!("no native file event within timeout"),
    }

    watcher.stop().await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(watcher.snapshot().is_empty());
}

#[tokio::test]
async fn removing_a_directory_unregisters_its_workflows() {
    let root = tempfile::tempdir().unwrap();
    let extra = tempfile::tempdir().unwrap();
    tokio::fs::write(root.path().join("release.md"), RELEASE).await.unwrap();
    let hotfix = RELEASE.replace("# Workflow: Release", "# Workflow: Hotfix");
    tokio::fs::write(extra.path().join("hotfix.md"), &hotfix).await.unwrap();

    let pipeline = pipeline();
    let live = Arc::new(LiveWorkflowSet::new(Arc::clone(&pipeline), 64));
    let mut events = live.subscribe();
    let mut watcher = WorkflowWatcher::new(live.clone(), Duration::from_millis(100));
    watcher.start(root.path(), true).await.unwrap();
    assert!(matches!(next(&mut events).await, RegistryEvent::Registered { .. }));

    assert_eq!(watcher.add_directory(extra.path(), true).await.unwrap(), 1);
    let added = match next(&mut events).await {
        RegistryEvent::Registered { path, .. } => path,
        other => panic!("expected Registered, got {other:?}"),
    };
    assert!(added.ends_with("hotfix.md"));
    assert_eq!(live.len(), 2);
    assert_eq!(pipeline.cache().len(), 2);

    assert_eq!(watcher.remove_directory(extra.path()).unwrap(), 1);
    assert_eq!(
        next(&mut events).await,
        RegistryEvent::Unregistered { path: added.clone() }
    );
    assert_eq!(live.len(), 1);
    assert!(live.get(&added).is_none());
    assert_eq!(pipeline.cache().len(), 1);
    assert!(pipeline.cache().hash_for(&added).is_none());

    watcher.stop().await;
}
