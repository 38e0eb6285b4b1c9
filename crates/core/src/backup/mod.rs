//! Watching, copying and cataloguing game autosaves.

/// Ordering and truncation of listings.
pub mod catalog;
/// Per-manager configuration.
pub mod config;
/// Grouping of safe-backup files into logical backups.
pub mod groups;
/// Repointable consumer handle.
pub mod handle;
/// Settle-then-copy worker.
pub mod ingest;
/// Manager lifecycle.
pub mod manager;
/// Backup file naming rules.
pub mod naming;
/// Waiting for the save directory.
pub mod readiness;
/// Active manager registry and reload.
pub mod registry;
/// Filesystem change subscription.
pub mod watcher;

pub use catalog::catalog;
pub use config::{BackupConfig, RetentionPolicy};
pub use groups::{scan_groups, BackupGroup, BackupKind};
pub use handle::ManagerHandle;
pub use manager::{BackupManager, ManagerState};
pub use registry::ManagerRegistry;
pub use watcher::{DirectoryWatcher, WatchEvents};
