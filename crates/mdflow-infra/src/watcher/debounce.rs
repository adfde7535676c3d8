//! Debounce task: coalesces raw notify events and classifies them.
//!
//! One timer, re-armed on every raw event. When it fires the pending queue is
//! drained with each path processed at most once. Classification reads the
//! file and compares it with the last known content:
//!
//! - unknown path, workflow-shaped content: Created
//! - known path, different bytes: Changed
//! - known path, file gone: Deleted
//!
//! Documents found by enumerating a watched directory are announced as
//! Created on this task too, and documents whose directory is no longer
//! watched as Deleted, so every event for a path comes from one place in
//! order. Everything else is dropped with a debug log. The stopped flag is checked
//! before every handler call, so nothing is emitted after `stop()` even when
//! a drain is already in progress.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mdflow_core::looks_like_workflow;
use mdflow_core::watch::WorkflowFileHandler;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::WatchState;

/// A native event reduced to what classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawEvent {
    /// Something happened to this path; re-read it at drain time.
    Touched(PathBuf),
    /// Atomic rename with both endpoints known.
    Renamed { from: PathBuf, to: PathBuf },
    Error {
        path: Option<PathBuf>,
        message: String,
    },
    /// Found while enumerating a newly watched directory.
    Discovered { path: PathBuf, content: String },
    /// Its directory was removed from the watch.
    Released(PathBuf),
}

#[derive(Debug)]
enum Pending {
    Touched,
    Renamed {
        from: PathBuf,
        prior: Option<String>,
    },
}

/// Pending events in first-arrival order, one entry per path.
#[derive(Debug, Default)]
struct PendingQueue {
    entries: Vec<(PathBuf, Pending)>,
}

impl PendingQueue {
    fn push(&mut self, path: PathBuf, pending: Pending) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            // A rename carries more information than a plain touch.
            Some(entry) => {
                if matches!(pending, Pending::Renamed { .. }) {
                    entry.1 = pending;
                }
            }
            None => self.entries.push((path, pending)),
        }
    }

    fn take(&mut self) -> Vec<(PathBuf, Pending)> {
        std::mem::take(&mut self.entries)
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawn the debounce task.
///
/// `initial` holds the documents registered by `start`; they are announced
/// as Created before any queued native event is looked at.
pub(crate) fn spawn(
    state: Arc<WatchState>,
    handler: Arc<dyn WorkflowFileHandler>,
    debounce: Duration,
    initial: Vec<(PathBuf, String)>,
    rx: mpsc::UnboundedReceiver<RawEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(state, handler, debounce, initial, rx, cancel))
}

async fn run(
    state: Arc<WatchState>,
    handler: Arc<dyn WorkflowFileHandler>,
    debounce: Duration,
    initial: Vec<(PathBuf, String)>,
    mut rx: mpsc::UnboundedReceiver<RawEvent>,
    cancel: CancellationToken,
) {
    for (path, content) in initial {
        if state.is_stopped() || cancel.is_cancelled() {
            return;
        }
        handler.on_file_created(&path, &content);
    }

    let mut queue = PendingQueue::default();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            raw = rx.recv() => {
                let Some(raw) = raw else { break };
                match raw {
                    RawEvent::Error { path, message } => {
                        report_error(&state, handler.as_ref(), path.as_deref(), &message);
                    }
                    RawEvent::Discovered { path, content } => {
                        discovered(&state, handler.as_ref(), path, content);
                    }
                    RawEvent::Released(path) => released(&state, handler.as_ref(), &path),
                    RawEvent::Touched(path) => {
                        if state.is_relevant(&path) {
                            queue.push(path, Pending::Touched);
                            deadline = Some(Instant::now() + debounce);
                        }
                    }
                    RawEvent::Renamed { from, to } => {
                        let prior = state.known.get(&from).map(|c| c.value().clone());
                        if state.is_relevant(&from) {
                            queue.push(from.clone(), Pending::Touched);
                        }
                        if state.is_relevant(&to) {
                            queue.push(to, Pending::Renamed { from, prior });
                        }
                        if !queue.is_empty() {
                            deadline = Some(Instant::now() + debounce);
                        }
                    }
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                drain(&state, handler.as_ref(), queue.take()).await;
            }
        }
    }
    tracing::debug!("watcher debounce task exited");
}

async fn drain(state: &WatchState, handler: &dyn WorkflowFileHandler, batch: Vec<(PathBuf, Pending)>) {
    tracing::debug!(count = batch.len(), "draining coalesced file events");
    let mut processed: HashSet<PathBuf> = HashSet::with_capacity(batch.len());

    for (path, pending) in batch {
        if state.is_stopped() {
            return;
        }
        if processed.contains(&path) {
            continue;
        }
        match pending {
            Pending::Touched => classify(state, handler, &path, None).await,
            Pending::Renamed { from, prior } => {
                // Deleted(from) strictly before Created(to).
                if processed.insert(from.clone()) {
                    classify(state, handler, &from, None).await;
                }
                classify(state, handler, &path, prior).await;
            }
        }
        processed.insert(path);
    }
}

/// Re-read `path` and emit at most one event for it.
///
/// `fallback` is the content a renamed file had under its old name; it is
/// used when the new path exists but cannot be read.
async fn classify(
    state: &WatchState,
    handler: &dyn WorkflowFileHandler,
    path: &Path,
    fallback: Option<String>,
) {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if state.known.remove(path).is_some() && !state.is_stopped() {
                tracing::debug!(path = %path.display(), "workflow file deleted");
                handler.on_file_deleted(path);
            }
            return;
        }
        Err(err) => match fallback {
            Some(prior) => prior,
            None => {
                report_error(state, handler, Some(path), &err.to_string());
                return;
            }
        },
    };

    let previous = state.known.get(path).map(|c| c.value().clone());
    match previous {
        Some(previous) if previous == content => {
            tracing::debug!(path = %path.display(), "content unchanged, event suppressed");
        }
        Some(previous) => {
            state.known.insert(path.to_path_buf(), content.clone());
            if !state.is_stopped() {
                handler.on_file_changed(path, &previous, &content);
            }
        }
        None if looks_like_workflow(&content) => {
            state.known.insert(path.to_path_buf(), content.clone());
            if !state.is_stopped() {
                handler.on_file_created(path, &content);
            }
        }
        None => {
            tracing::debug!(path = %path.display(), "not a workflow document, ignored");
        }
    }
}

/// Register a document found in a newly added directory.
///
/// A path already known was reported by a native event first and is left
/// to the drain.
fn discovered(state: &WatchState, handler: &dyn WorkflowFileHandler, path: PathBuf, content: String) {
    if !state.is_relevant(&path) || state.known.contains_key(&path) {
        return;
    }
    state.known.insert(path.clone(), content.clone());
    if !state.is_stopped() {
        handler.on_file_created(&path, &content);
    }
}

/// Forget a document whose directory is no longer watched.
fn released(state: &WatchState, handler: &dyn WorkflowFileHandler, path: &Path) {
    if state.is_watched(path) || state.known.remove(path).is_none() {
        return;
    }
    tracing::debug!(path = %path.display(), "workflow file no longer watched");
    if !state.is_stopped() {
        handler.on_file_deleted(path);
    }
}

fn report_error(state: &WatchState, handler: &dyn WorkflowFileHandler, path: Option<&Path>, message: &str) {
    if state.is_stopped() {
        return;
    }
    tracing::warn!(path = ?path, error = %message, "file watcher I/O error");
    handler.on_watch_error(path, message);
}
