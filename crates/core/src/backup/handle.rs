//! Consumer-side reference to whichever manager is currently active.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;

use crate::error::BackupError;

use super::{groups::BackupGroup, manager::BackupManager};

/// Cloneable pointer to the active [`BackupManager`].
///
/// Request handlers hold one of these; the registry repoints it on reload so
/// callers never keep talking to a manager that has been shut down.
#[derive(Debug, Clone, Default)]
pub struct ManagerHandle {
    manager: Arc<RwLock<Option<Arc<BackupManager>>>>,
}

impl ManagerHandle {
    /// Handle not yet pointing at any manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle pointing at `manager`.
    pub fn with_manager(manager: Arc<BackupManager>) -> Self {
        let handle = Self::new();
        handle.repoint(manager);
        handle
    }

    /// Point this handle (and all its clones) at `manager`.
    pub fn repoint(&self, manager: Arc<BackupManager>) {
        *self.manager.write() = Some(manager);
    }

    /// Manager the handle currently points at.
    pub fn manager(&self) -> Option<Arc<BackupManager>> {
        self.manager.read().clone()
    }

    /// List backups through the current manager.
    pub fn list_backups(&self, limit: usize) -> Result<Vec<BackupGroup>, BackupError> {
        let manager = self.manager().ok_or(BackupError::NoActiveManager)?;
        manager.list_backups(limit)
    }

    /// [`list_backups`](Self::list_backups) on the blocking pool.
    ///
    /// Listing walks the safe-backup tree under the manager lock; async
    /// request handlers use this instead of blocking a runtime worker.
    pub async fn list_backups_async(&self, limit: usize) -> Result<Vec<BackupGroup>> {
        let handle = self.clone();
        let groups = tokio::task::spawn_blocking(move || handle.list_backups(limit))
            .await
            .context("backup listing task failed")??;
        Ok(groups)
    }

    /// JSON body for a backup listing request.
    pub fn list_backups_json(&self, limit: usize) -> Result<String> {
        let groups = self.list_backups(limit)?;
        serde_json::to_string_pretty(&groups).context("failed to serialize backup list")
    }
}
