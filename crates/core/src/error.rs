//! Error taxonomy for the backup manager.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failures raised while preparing, watching, copying or listing backups.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackupError {
    /// The source path exists but is a regular file or something else.
    #[error("backup path {} is not a directory", path.display())]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// Checking the source directory failed with something other than "not found".
    #[error("error checking backup directory {}: {source}", path.display())]
    Stat {
        /// Path that was inspected.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// The manager was shut down while waiting.
    #[error("cancelled, the configuration was likely changed")]
    Cancelled,

    /// The source directory never appeared.
    #[error(
        "timeout after {timeout:?} waiting for backup directory {} to be created",
        path.display()
    )]
    Timeout {
        /// Directory that was awaited.
        path: PathBuf,
        /// Configured upper bound.
        timeout: Duration,
    },

    /// The safe-backup directory could not be created.
    #[error("error creating safe backup directory {}: {source}", path.display())]
    DirectoryCreate {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// The filesystem subscription could not be established.
    #[error("failed to watch {}: {source}", path.display())]
    WatchSetup {
        /// Directory that was to be watched.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: notify::Error,
    },

    /// Copying a detected backup into the safe tree failed.
    #[error("error copying backup {}: {reason}", path.display())]
    Copy {
        /// Source file of the failed copy.
        path: PathBuf,
        /// Description of the failing step.
        reason: String,
    },

    /// Walking the safe-backup tree failed.
    #[error("failed to walk safe backup dir {}: {source}", path.display())]
    Scan {
        /// Root of the walk.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: walkdir::Error,
    },

    /// No manager has been published to the caller yet.
    #[error("backup manager not initialized")]
    NoActiveManager,

    /// The save directory has not been created by the game yet.
    #[error(
        "save dir {} doesn't seem to exist (yet). Start the gameserver and refresh once it's up. \
         If the save folder exists and you still get this error, verify the \
         'Use New Terrain and Save System' setting",
        path.display()
    )]
    SaveDirNotReady {
        /// Directory that was expected to exist.
        path: PathBuf,
    },
}

impl BackupError {
    /// Short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackupError::NotADirectory { .. } => "not_a_directory",
            BackupError::Stat { .. } => "stat_error",
            BackupError::Cancelled => "cancelled",
            BackupError::Timeout { .. } => "timeout",
            BackupError::DirectoryCreate { .. } => "directory_create_error",
            BackupError::WatchSetup { .. } => "watch_setup_error",
            BackupError::Copy { .. } => "copy_error",
            BackupError::Scan { .. } => "scan_error",
            BackupError::NoActiveManager => "no_active_manager",
            BackupError::SaveDirNotReady { .. } => "save_dir_not_ready",
        }
    }

    /// Whether a caller may simply retry later.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, BackupError::SaveDirNotReady { .. })
    }

    pub(crate) fn copy(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BackupError::Copy {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_message_is_actionable() {
        let err = BackupError::SaveDirNotReady {
            path: PathBuf::from("saves/world/Safebackups"),
        };
        assert!(err.is_not_ready());
        assert_eq!(err.as_label(), "save_dir_not_ready");
        assert!(err.to_string().contains("Start the gameserver"));
    }
}
