//! Settle-then-copy of detected autosaves into the safe-backup tree.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::BackupError;

use super::{manager::BackupManager, naming::is_backup_path};

impl BackupManager {
    /// React to a created entry under the source directory.
    ///
    /// Returns `true` when a copy was scheduled; entries that do not look like
    /// backups are ignored without side effects.
    pub fn handle_created(self: &Arc<Self>, path: PathBuf) -> bool {
        if !is_backup_path(&path) {
            return false;
        }

        info!(id = %self.identifier(), path = %path.display(), "New backup file detected");
        let manager = Arc::clone(self);
        self.tracker.spawn(async move { manager.ingest(path).await });
        true
    }

    async fn ingest(self: Arc<Self>, path: PathBuf) {
        // Not cancellable: shutdown waits for detected backups to land.
        let delay = self.config().effective_settle_delay();
        debug!(
            id = %self.identifier(),
            path = %path.display(),
            delay_ms = delay.as_millis() as u64,
            "Waiting for backup file to settle"
        );
        sleep(delay).await;

        let manager = Arc::clone(&self);
        let copied = tokio::task::spawn_blocking(move || {
            let _tree = manager.inner.lock();
            let config = manager.config();
            copy_into_safe_tree(&config.backup_dir, &config.safe_backup_dir, &path)
        })
        .await;

        match copied {
            Ok(Ok(destination)) => info!(
                id = %self.identifier(),
                path = %destination.display(),
                "Backup successfully copied to safe location"
            ),
            Ok(Err(err)) => error!(id = %self.identifier(), error = %err, "Backup copy failed"),
            Err(err) => error!(id = %self.identifier(), error = %err, "Backup copy task panicked"),
        }
    }
}

/// Destination of `file` when mirrored from `source_root` into `safe_root`.
pub fn mirror_path(
    source_root: &Path,
    safe_root: &Path,
    file: &Path,
) -> Result<PathBuf, BackupError> {
    if let Ok(relative) = file.strip_prefix(source_root) {
        return Ok(safe_root.join(relative));
    }

    // Event paths may be absolute while the configured root is relative.
    let canonical_root = fs::canonicalize(source_root)
        .map_err(|err| BackupError::copy(file, format!("failed to resolve source root: {err}")))?;
    let canonical_file = fs::canonicalize(file)
        .map_err(|err| BackupError::copy(file, format!("failed to resolve path: {err}")))?;
    canonical_file
        .strip_prefix(&canonical_root)
        .map(|relative| safe_root.join(relative))
        .map_err(|_| BackupError::copy(file, format!("not under {}", source_root.display())))
}

/// Copy `file` to its mirrored location under `safe_root`.
///
/// Data is staged in a hidden temporary file next to the destination and
/// renamed into place once fully written, so a failed copy never leaves a
/// truncated backup behind.
pub fn copy_into_safe_tree(
    source_root: &Path,
    safe_root: &Path,
    file: &Path,
) -> Result<PathBuf, BackupError> {
    let destination = mirror_path(source_root, safe_root, file)?;
    let parent = destination
        .parent()
        .ok_or_else(|| BackupError::copy(file, "destination has no parent directory"))?;
    fs::create_dir_all(parent).map_err(|err| {
        BackupError::copy(file, format!("failed to create {}: {err}", parent.display()))
    })?;

    let mut reader = File::open(file)
        .map_err(|err| BackupError::copy(file, format!("failed to open: {err}")))?;
    let is_file = reader
        .metadata()
        .map(|meta| meta.is_file())
        .map_err(|err| BackupError::copy(file, format!("failed to stat: {err}")))?;
    if !is_file {
        return Err(BackupError::copy(file, "not a regular file"));
    }

    let mut staged = tempfile::Builder::new()
        .prefix(".sbm-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|err| BackupError::copy(file, format!("failed to stage copy: {err}")))?;
    io::copy(&mut reader, staged.as_file_mut())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|err| BackupError::copy(file, format!("failed to write: {err}")))?;
    staged.persist(&destination).map_err(|err| {
        BackupError::copy(file, format!("failed to move into place: {}", err.error))
    })?;

    Ok(destination)
}
