//! Filesystem watcher for workflow documents, using the `notify` crate.
//!
//! Provides:
//! - `WorkflowWatcher` -- Stopped/Watching lifecycle over one or more directories
//! - `FileWatchError` -- failures starting or reconfiguring the watch
//!
//! Native notify callbacks only forward reduced [`RawEvent`]s into a channel.
//! All classification happens on the debounce task (see [`debounce`]), which
//! calls the [`WorkflowFileHandler`] given at construction.

mod debounce;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use mdflow_core::looks_like_workflow;
use mdflow_core::watch::WorkflowFileHandler;
use mdflow_types::config::WatchConfig;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use debounce::RawEvent;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while starting or reconfiguring a watch.
#[derive(Debug, thiserror::Error)]
pub enum FileWatchError {
    /// Failed to create the native filesystem watcher.
    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    /// Failed to add or remove a path on the native watcher.
    #[error("failed to watch path '{path}': {reason}")]
    WatchPath { path: String, reason: String },

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("watcher is already running")]
    AlreadyWatching,

    #[error("watcher is not running")]
    NotWatching,

    /// The cancellation token fired while enumerating existing files.
    #[error("watch start cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Watching,
}

/// State shared between the public API and the debounce task.
#[derive(Debug)]
pub(crate) struct WatchState {
    /// Last known content per workflow path.
    pub(crate) known: DashMap<PathBuf, String>,
    /// Watched directory -> recursive flag.
    pub(crate) directories: DashMap<PathBuf, bool>,
    extensions: Vec<String>,
    pub(crate) stopped: AtomicBool,
}

impl WatchState {
    pub(crate) fn new(extensions: Vec<String>) -> Self {
        Self {
            known: DashMap::new(),
            directories: DashMap::new(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.directories.iter().any(|entry| {
            if *entry.value() {
                path.starts_with(entry.key())
            } else {
                path.parent() == Some(entry.key().as_path())
            }
        })
    }

    /// A path the debounce task should consider at all.
    pub(crate) fn is_relevant(&self, path: &Path) -> bool {
        self.has_extension(path) && self.is_watched(path)
    }
}

// ---------------------------------------------------------------------------
// Native event translation
// ---------------------------------------------------------------------------

fn translate(result: notify::Result<notify::Event>) -> Vec<RawEvent> {
    match result {
        Ok(event) => match event.kind {
            EventKind::Access(_) => vec![],
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                let mut paths = event.paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => vec![RawEvent::Renamed { from, to }],
                    _ => vec![],
                }
            }
            _ => event.paths.into_iter().map(RawEvent::Touched).collect(),
        },
        Err(err) => vec![RawEvent::Error {
            path: err.paths.first().cloned(),
            message: err.to_string(),
        }],
    }
}

// ---------------------------------------------------------------------------
// Watcher lifecycle
// ---------------------------------------------------------------------------

struct Session {
    watcher: RecommendedWatcher,
    state: Arc<WatchState>,
    /// Feeds registrations from the public API into the debounce task.
    events: mpsc::UnboundedSender<RawEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Debounced watcher over directories of workflow documents.
///
/// Existing documents are announced to the handler as created when watching
/// begins, followed by every later change. All handler calls come from one
/// background task, so events for a path arrive in order.
pub struct WorkflowWatcher {
    handler: Arc<dyn WorkflowFileHandler>,
    debounce: Duration,
    extensions: Vec<String>,
    session: Option<Session>,
}

impl WorkflowWatcher {
    pub fn new(handler: Arc<dyn WorkflowFileHandler>, debounce: Duration) -> Self {
        Self {
            handler,
            debounce,
            extensions: vec!["md".to_string(), "markdown".to_string()],
            session: None,
        }
    }

    pub fn from_config(handler: Arc<dyn WorkflowFileHandler>, config: &WatchConfig) -> Self {
        Self::new(handler, config.debounce()).with_extensions(config.extensions.clone())
    }

    /// File extensions (without dot) treated as workflow documents.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn state(&self) -> WatcherState {
        match self.session {
            Some(_) => WatcherState::Watching,
            None => WatcherState::Stopped,
        }
    }

    /// Start watching `directory`. Returns the number of documents found.
    pub async fn start(&mut self, directory: &Path, recursive: bool) -> Result<usize, FileWatchError> {
        self.start_cancellable(directory, recursive, CancellationToken::new())
            .await
    }

    /// Like [`start`](Self::start), but cancelling `cancel` aborts enumeration
    /// with [`FileWatchError::Cancelled`] and, once running, stops event delivery.
    pub async fn start_cancellable(
        &mut self,
        directory: &Path,
        recursive: bool,
        cancel: CancellationToken,
    ) -> Result<usize, FileWatchError> {
        if self.session.is_some() {
            return Err(FileWatchError::AlreadyWatching);
        }
        let directory = canonical_directory(directory).await?;

        let (tx, rx) = mpsc::unbounded_channel::<RawEvent>();
        let events = tx.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            for raw in translate(result) {
                // Receiver gone means the watcher is stopping.
                let _ = tx.send(raw);
            }
        })
        .map_err(|e| FileWatchError::WatcherCreation(e.to_string()))?;
        watch_native(&mut watcher, &directory, recursive)?;

        let state = Arc::new(WatchState::new(self.extensions.clone()));
        state.directories.insert(directory.clone(), recursive);
        let initial = enumerate_workflows(&state, &directory, recursive, &cancel).await?;
        for (path, content) in &initial {
            state.known.insert(path.clone(), content.clone());
        }
        let registered = initial.len();

        let cancel = cancel.child_token();
        let task = debounce::spawn(
            Arc::clone(&state),
            Arc::clone(&self.handler),
            self.debounce,
            initial,
            rx,
            cancel.clone(),
        );

        tracing::info!(
            path = %directory.display(),
            recursive,
            registered,
            debounce_ms = self.debounce.as_millis() as u64,
            "file watcher started"
        );
        self.session = Some(Session {
            watcher,
            state,
            events,
            cancel,
            task,
        });
        Ok(registered)
    }

    /// Watch an additional directory. Returns the number of documents found.
    ///
    /// Found documents not already known are announced as created by the
    /// background task.
    pub async fn add_directory(&mut self, directory: &Path, recursive: bool) -> Result<usize, FileWatchError> {
        let directory = canonical_directory(directory).await?;
        let session = self.session.as_mut().ok_or(FileWatchError::NotWatching)?;
        watch_native(&mut session.watcher, &directory, recursive)?;
        session.state.directories.insert(directory.clone(), recursive);
        let found =
            enumerate_workflows(&session.state, &directory, recursive, &session.cancel).await?;
        let registered = found.len();
        for (path, content) in found {
            session.send(RawEvent::Discovered { path, content });
        }
        tracing::info!(path = %directory.display(), registered, "watch directory added");
        Ok(registered)
    }

    /// Stop watching a directory. Returns the number of documents forgotten.
    ///
    /// Each forgotten document is reported to the handler as deleted.
    pub fn remove_directory(&mut self, directory: &Path) -> Result<usize, FileWatchError> {
        let session = self.session.as_mut().ok_or(FileWatchError::NotWatching)?;
        let canonical = directory.canonicalize().ok();
        let key = session
            .state
            .directories
            .iter()
            .map(|e| e.key().clone())
            .find(|d| d.as_path() == directory || canonical.as_deref() == Some(d.as_path()))
            .ok_or_else(|| FileWatchError::WatchPath {
                path: directory.display().to_string(),
                reason: "not watched".to_string(),
            })?;

        session
            .watcher
            .unwatch(&key)
            .map_err(|e| FileWatchError::WatchPath {
                path: key.display().to_string(),
                reason: e.to_string(),
            })?;
        session.state.directories.remove(&key);

        let released: Vec<PathBuf> = session
            .state
            .known
            .iter()
            .map(|e| e.key().clone())
            .filter(|path| !session.state.is_watched(path))
            .collect();
        let forgotten = released.len();
        for path in released {
            session.send(RawEvent::Released(path));
        }
        tracing::info!(path = %key.display(), forgotten, "watch directory removed");
        Ok(forgotten)
    }

    /// Whether `path` lies under a currently watched directory.
    pub fn is_watched(&self, path: &Path) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.state.is_watched(path))
    }

    /// Watched directories, sorted.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .session
            .iter()
            .flat_map(|s| s.state.directories.iter().map(|e| e.key().clone()).collect::<Vec<_>>())
            .collect();
        dirs.sort();
        dirs
    }

    /// Copy of the last known content of every registered document.
    pub fn snapshot(&self) -> HashMap<PathBuf, String> {
        self.session
            .as_ref()
            .map(|s| {
                s.state
                    .known
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stop watching and clear all content snapshots.
    ///
    /// No handler is invoked after this returns, even for queued events.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.state.stopped.store(true, Ordering::SeqCst);
        session.cancel.cancel();
        drop(session.watcher);
        if let Err(err) = session.task.await {
            tracing::warn!(error = %err, "watcher debounce task failed");
        }
        session.state.known.clear();
        session.state.directories.clear();
        tracing::info!("file watcher stopped");
    }
}

impl Session {
    fn send(&self, raw: RawEvent) {
        if self.events.send(raw).is_err() {
            tracing::debug!("watcher debounce task gone, registration dropped");
        }
    }
}

impl Drop for WorkflowWatcher {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.state.stopped.store(true, Ordering::SeqCst);
            session.cancel.cancel();
            tracing::debug!("file watcher dropped");
        }
    }
}

impl std::fmt::Debug for WorkflowWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowWatcher")
            .field("state", &self.state())
            .field("debounce", &self.debounce)
            .field("extensions", &self.extensions)
            .finish()
    }
}

async fn canonical_directory(directory: &Path) -> Result<PathBuf, FileWatchError> {
    let canonical = tokio::fs::canonicalize(directory)
        .await
        .map_err(|e| FileWatchError::WatchPath {
            path: directory.display().to_string(),
            reason: e.to_string(),
        })?;
    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| FileWatchError::WatchPath {
            path: canonical.display().to_string(),
            reason: e.to_string(),
        })?;
    if !meta.is_dir() {
        return Err(FileWatchError::NotADirectory(directory.to_path_buf()));
    }
    Ok(canonical)
}

fn watch_native(watcher: &mut RecommendedWatcher, directory: &Path, recursive: bool) -> Result<(), FileWatchError> {
    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(directory, mode)
        .map_err(|e| FileWatchError::WatchPath {
            path: directory.display().to_string(),
            reason: e.to_string(),
        })
}

/// Read every workflow-shaped document under `directory`.
///
/// Unreadable entries are logged and skipped.
async fn enumerate_workflows(
    state: &WatchState,
    directory: &Path,
    recursive: bool,
    cancel: &CancellationToken,
) -> Result<Vec<(PathBuf, String)>, FileWatchError> {
    let mut found = Vec::new();
    let mut pending = vec![directory.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %dir.display(), error = %err, "cannot read directory, skipping");
                continue;
            }
        };
        loop {
            if cancel.is_cancelled() {
                return Err(FileWatchError::Cancelled);
            }
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(path = %dir.display(), error = %err, "directory listing failed");
                    break;
                }
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
                continue;
            }
            if !state.has_extension(&path) {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) if looks_like_workflow(&content) => found.push((path, content)),
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "not a workflow document, skipped");
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot read document, skipping");
                }
            }
        }
    }
    Ok(found)
}
