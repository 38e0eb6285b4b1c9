//! Filesystem subscription for the autosave directory.
//!
//! `notify` delivers events on its own thread; the callback bridges them into
//! two tokio channels so the watch loop can `select!` over creations, errors
//! and cancellation.

use std::path::{Path, PathBuf};

use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BackupError;

/// Receiving ends of a [`DirectoryWatcher`].
///
/// Both channels close once the watcher is closed or dropped.
#[derive(Debug)]
pub struct WatchEvents {
    /// Paths of newly created entries.
    pub created: mpsc::UnboundedReceiver<PathBuf>,
    /// Non-fatal errors reported by the OS backend.
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Owns the OS watch on a source directory.
pub struct DirectoryWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .field("open", &self.watcher.is_some())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Start watching `path` recursively.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, WatchEvents), BackupError> {
        let path = path.into();
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let setup_error = |source: notify::Error| BackupError::WatchSetup {
            path: path.clone(),
            source,
        };

        let mut watcher = notify::recommended_watcher(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_creation(&event.kind) => {
                    for path in event.paths {
                        let _ = created_tx.send(path);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    let _ = errors_tx.send(err);
                }
            },
        )
        .map_err(setup_error)?;

        watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(setup_error)?;
        debug!(path = %path.display(), "Directory watch established");

        Ok((
            Self {
                path,
                watcher: Some(watcher),
            },
            WatchEvents {
                created: created_rx,
                errors: errors_rx,
            },
        ))
    }

    /// Watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the OS watch is still held.
    pub fn is_open(&self) -> bool {
        self.watcher.is_some()
    }

    /// Release the OS watch. Calling this more than once is a no-op.
    pub fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(err) = watcher.unwatch(&self.path) {
                debug!(path = %self.path.display(), error = %err, "Unwatch failed");
            }
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Creations, including entries renamed into the tree.
fn is_creation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}
