//! Per-manager configuration.

use std::{path::PathBuf, time::Duration};

use uuid::Uuid;

use crate::settings::{AppConfig, RetentionSettings};

/// Settle delay used when none is configured.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(30);
/// Interval between checks for the save directory.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);
/// How long to wait for the game to create the save directory.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(90 * 60);

/// Retention rules for the safe-backup tree.
///
/// Carried through configuration but not evaluated anywhere yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of most recent backups to keep.
    pub keep_last: usize,
    /// Window in which one backup per week is kept.
    pub keep_weekly_for: Duration,
    /// Window in which one backup per month is kept.
    pub keep_monthly_for: Duration,
    /// Time between cleanup passes.
    pub cleanup_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionSettings::default().into()
    }
}

impl From<RetentionSettings> for RetentionPolicy {
    fn from(settings: RetentionSettings) -> Self {
        const DAY: u64 = 24 * 60 * 60;
        Self {
            keep_last: settings.keep_last,
            keep_weekly_for: Duration::from_secs(settings.keep_weekly_days * DAY),
            keep_monthly_for: Duration::from_secs(settings.keep_monthly_days * DAY),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs),
        }
    }
}

/// Immutable configuration owned by a single [`BackupManager`](super::BackupManager).
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Label of the world being protected.
    pub world_name: String,
    /// Directory the game writes autosaves into.
    pub backup_dir: PathBuf,
    /// Directory confirmed copies are mirrored into.
    pub safe_backup_dir: PathBuf,
    /// Wait after a file appears before copying it.
    pub settle_delay: Duration,
    /// Retention rules (inert).
    pub retention: RetentionPolicy,
    /// Short tag prefixed to diagnostics, e.g. `[BM1a2b3c]:`.
    pub identifier: String,
    /// Interval between save directory checks.
    pub poll_interval: Duration,
    /// Upper bound for the save directory to appear.
    pub readiness_timeout: Duration,
}

impl BackupConfig {
    /// Configuration with default timings and a fresh identifier.
    pub fn new(
        world_name: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
        safe_backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            world_name: world_name.into(),
            backup_dir: backup_dir.into(),
            safe_backup_dir: safe_backup_dir.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            retention: RetentionPolicy::default(),
            identifier: new_identifier(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Derive the autosave layout of the game server from application settings.
    pub fn from_app(app: &AppConfig) -> Self {
        let save_root = app.save_root();
        Self {
            settle_delay: Duration::from_secs(app.settle_delay_secs),
            retention: app.retention.clone().into(),
            poll_interval: Duration::from_millis(app.poll_interval_ms),
            readiness_timeout: Duration::from_secs(app.readiness_timeout_secs),
            ..Self::new(
                app.save_name.clone(),
                save_root.join("autosave"),
                save_root.join("Safebackups"),
            )
        }
    }

    /// Override the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Override the readiness polling parameters.
    pub fn with_readiness(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.readiness_timeout = timeout;
        self
    }

    /// Settle delay with the zero value mapped to [`DEFAULT_SETTLE_DELAY`].
    pub fn effective_settle_delay(&self) -> Duration {
        if self.settle_delay.is_zero() {
            DEFAULT_SETTLE_DELAY
        } else {
            self.settle_delay
        }
    }
}

fn new_identifier() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("[BM{}]:", &id[..6])
}
