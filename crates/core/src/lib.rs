#![warn(clippy::all, missing_docs)]

//! Core of the Stationeers backup manager.
//!
//! Watches a game server's autosave directory, copies new autosaves into a
//! safe-backup tree once they have settled, and lists the backups found
//! there. Settings handling lives here too so every frontend resolves the
//! same directory layout.

pub mod backup;
pub mod error;
pub mod settings;

pub use backup::{BackupConfig, BackupGroup, BackupManager, ManagerHandle, ManagerRegistry};
pub use error::BackupError;
pub use settings::{AppConfig, LogLevel, SettingsSource};
