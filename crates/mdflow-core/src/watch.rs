//! Port between the file watcher and whatever consumes its events.
//!
//! The watcher implementation lives in mdflow-infra; it only knows this
//! trait. Callbacks run on the watcher's drain task and must not block for
//! long.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

/// Receives debounced, classified file events for one watcher.
///
/// For a given path, callbacks are delivered in order. No ordering holds
/// across different paths.
pub trait WorkflowFileHandler: Send + Sync {
    /// A new document that passes the minimal workflow shape check.
    fn on_file_created(&self, path: &Path, content: &str);

    /// A known document whose bytes changed.
    fn on_file_changed(&self, path: &Path, previous: &str, current: &str);

    /// A known document disappeared.
    fn on_file_deleted(&self, path: &Path);

    /// A watcher-level I/O error. The watch loop keeps running.
    fn on_watch_error(&self, path: Option<&Path>, message: &str) {
        tracing::warn!(path = ?path, error = %message, "file watcher error");
    }
}

/// A classified watcher event, as delivered by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created {
        path: PathBuf,
        content: String,
    },
    Changed {
        path: PathBuf,
        previous: String,
        current: String,
    },
    Deleted {
        path: PathBuf,
    },
    Error {
        path: Option<PathBuf>,
        message: String,
    },
}

impl WatchEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Created { path, .. }
            | WatchEvent::Changed { path, .. }
            | WatchEvent::Deleted { path } => Some(path),
            WatchEvent::Error { path, .. } => path.as_deref(),
        }
    }
}

/// Handler that forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: WatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("watch event receiver dropped");
        }
    }
}

impl WorkflowFileHandler for ChannelHandler {
    fn on_file_created(&self, path: &Path, content: &str) {
        self.send(WatchEvent::Created {
            path: path.to_path_buf(),
            content: content.to_string(),
        });
    }

    fn on_file_changed(&self, path: &Path, previous: &str, current: &str) {
        self.send(WatchEvent::Changed {
            path: path.to_path_buf(),
            previous: previous.to_string(),
            current: current.to_string(),
        });
    }

    fn on_file_deleted(&self, path: &Path) {
        self.send(WatchEvent::Deleted {
            path: path.to_path_buf(),
        });
    }

    fn on_watch_error(&self, path: Option<&Path>, message: &str) {
        self.send(WatchEvent::Error {
            path: path.map(Path::to_path_buf),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_handler_forwards_in_order() {
        let (handler, mut rx) = ChannelHandler::new();
        let path = Path::new("flows/a.md");
        handler.on_file_created(path, "one");
        handler.on_file_changed(path, "one", "two");
        handler.on_file_deleted(path);
        handler.on_watch_error(None, "permission denied");

        assert_eq!(
            rx.recv().await.unwrap(),
            WatchEvent::Created {
                path: path.to_path_buf(),
                content: "one".into()
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), WatchEvent::Changed { current, .. } if current == "two"));
        assert_eq!(rx.recv().await.unwrap().path(), Some(path));
        assert_eq!(rx.recv().await.unwrap().path(), None);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (handler, rx) = ChannelHandler::new();
        drop(rx);
        handler.on_file_deleted(Path::new("gone.md"));
    }
}
