//! Lifecycle of a single backup manager instance.
//!
//! A manager waits for the autosave directory, watches it, copies new
//! autosaves into the safe-backup tree and lists what has been copied.
//! Every instance is independent; background work only begins with
//! [`BackupManager::start`] and ends with [`BackupManager::shutdown`], after
//! which the instance is spent. Two instances pointed at overlapping
//! directories will race with each other.

use std::{fmt, io, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::error::BackupError;

use super::{
    catalog::catalog,
    config::BackupConfig,
    groups::{scan_groups, BackupGroup},
    readiness::{ensure_safe_dir, wait_for_directory},
    watcher::{DirectoryWatcher, WatchEvents},
};

/// Lifecycle stage of a [`BackupManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Built but not started.
    Constructed,
    /// Waiting for the autosave directory.
    Initializing,
    /// Watch loop running.
    Watching,
    /// Shutdown requested, waiting for background work.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ManagerState::Constructed => "constructed",
            ManagerState::Initializing => "initializing",
            ManagerState::Watching => "watching",
            ManagerState::ShuttingDown => "shutting-down",
            ManagerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub(super) struct ManagerInner {
    state: ManagerState,
    watcher: Option<DirectoryWatcher>,
}

/// Watches one autosave directory and maintains its safe-backup tree.
#[derive(Debug)]
pub struct BackupManager {
    config: BackupConfig,
    /// Guards lifecycle state, the watcher handle and every access to the
    /// safe-backup tree.
    pub(super) inner: Mutex<ManagerInner>,
    pub(super) cancel: CancellationToken,
    pub(super) tracker: TaskTracker,
}

impl BackupManager {
    /// Build a manager; nothing runs until [`start`](Self::start).
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(ManagerInner {
                state: ManagerState::Constructed,
                watcher: None,
            }),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Diagnostic tag of this instance.
    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    /// Current lifecycle stage.
    pub fn state(&self) -> ManagerState {
        self.inner.lock().state
    }

    /// Background tasks (readiness wait, watch loop, pending copies) still running.
    pub fn outstanding_work(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for the autosave directory and create the safe-backup directory.
    ///
    /// The check runs as a background task; the returned receiver yields its
    /// single result. After shutdown the receiver resolves to `Cancelled`.
    pub fn initialize(&self) -> oneshot::Receiver<Result<(), BackupError>> {
        let (tx, rx) = oneshot::channel();
        let _inner = self.inner.lock();

        if self.cancel.is_cancelled() {
            let _ = tx.send(Err(BackupError::Cancelled));
            return rx;
        }

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let result = async {
                wait_for_directory(
                    &config.backup_dir,
                    config.poll_interval,
                    config.readiness_timeout,
                    &cancel,
                    &config.identifier,
                )
                .await?;
                ensure_safe_dir(&config.safe_backup_dir).await?;
                debug!(
                    id = %config.identifier,
                    path = %config.safe_backup_dir.display(),
                    "Safe backup directory ready"
                );
                Ok::<(), BackupError>(())
            }
            .await;
            let _ = tx.send(result);
        });
        rx
    }

    /// Initialize, then watch the autosave directory until shutdown.
    ///
    /// Returns once the watch loop is running. Readiness and watch setup
    /// failures are returned and leave the manager stopped. Starting a manager
    /// that is already running is a no-op; starting a stopped one fails with
    /// `Cancelled`.
    pub async fn start(self: &Arc<Self>) -> Result<(), BackupError> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ManagerState::Constructed if !self.cancel.is_cancelled() => {
                    inner.state = ManagerState::Initializing;
                }
                ManagerState::Initializing | ManagerState::Watching => {
                    warn!(
                        id = %self.identifier(),
                        state = %inner.state,
                        "Backup manager already started"
                    );
                    return Ok(());
                }
                _ => return Err(BackupError::Cancelled),
            }
        }

        debug!(id = %self.identifier(), "Waiting for save folder initialization");
        let initialized = self
            .initialize()
            .await
            .unwrap_or(Err(BackupError::Cancelled));
        if let Err(err) = initialized {
            self.fail_start();
            return Err(err);
        }

        let (watcher, events) = match DirectoryWatcher::open(&self.config.backup_dir) {
            Ok(opened) => opened,
            Err(err) => {
                self.fail_start();
                return Err(err);
            }
        };

        {
            let mut inner = self.inner.lock();
            if self.cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            inner.watcher = Some(watcher);
            inner.state = ManagerState::Watching;

            let manager = Arc::clone(self);
            self.tracker.spawn(async move { manager.watch_backups(events).await });
        }

        info!(id = %self.identifier(), "Backup manager instance started");
        Ok(())
    }

    fn fail_start(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ManagerState::Initializing {
            inner.state = ManagerState::Stopped;
        }
    }

    async fn watch_backups(self: Arc<Self>, mut events: WatchEvents) {
        debug!(id = %self.identifier(), "Starting backup file watcher");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(id = %self.identifier(), "Watch loop cancelled");
                    break;
                }
                created = events.created.recv() => match created {
                    Some(path) => {
                        self.handle_created(path);
                    }
                    None => break,
                },
                failure = events.errors.recv() => match failure {
                    Some(err) => {
                        error!(id = %self.identifier(), error = %err, "Backup watcher error")
                    }
                    None => break,
                },
            }
        }

        info!(id = %self.identifier(), "Backup file watcher stopped");
    }

    /// Backups currently in the safe-backup tree, newest first.
    ///
    /// `limit` of `0` returns every backup. The tree is rescanned on every call
    /// and serialised with in-flight copies, so this blocks; async callers go
    /// through [`ManagerHandle::list_backups_async`](super::ManagerHandle::list_backups_async).
    pub fn list_backups(&self, limit: usize) -> Result<Vec<BackupGroup>, BackupError> {
        let _tree = self.inner.lock();
        let groups = scan_groups(&self.config.safe_backup_dir)?;

        if groups.is_empty() && source_missing(&self.config) {
            return Err(BackupError::SaveDirNotReady {
                path: self.config.backup_dir.clone(),
            });
        }

        Ok(catalog(groups, limit))
    }

    /// Stop watching and wait for every background task to finish.
    ///
    /// Backups already detected finish their settle delay and copy before
    /// this returns. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!(id = %self.identifier(), "Shutting down backup manager");
        {
            let mut inner = self.inner.lock();
            if inner.state != ManagerState::Stopped {
                inner.state = ManagerState::ShuttingDown;
            }
            self.cancel.cancel();
            if let Some(mut watcher) = inner.watcher.take() {
                watcher.close();
                debug!(id = %self.identifier(), "File watcher closed");
            }
        }

        self.tracker.close();
        debug!(
            id = %self.identifier(),
            pending = self.tracker.len(),
            "Waiting for background tasks to complete"
        );
        self.tracker.wait().await;

        self.inner.lock().state = ManagerState::Stopped;
        info!(id = %self.identifier(), "Backup manager shut down completely");
    }
}

fn source_missing(config: &BackupConfig) -> bool {
    matches!(
        std::fs::metadata(&config.backup_dir),
        Err(err) if err.kind() == io::ErrorKind::NotFound
    )
}
