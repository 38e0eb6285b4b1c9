//! Waiting for the game to create its save directory.

use std::{io, path::Path, time::Duration};

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BackupError;

/// Poll until `path` exists as a directory.
///
/// Fails fast when the path is something other than a directory or cannot be
/// inspected, and gives up on cancellation or once `timeout` has elapsed.
pub async fn wait_for_directory(
    path: &Path,
    poll_interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    identifier: &str,
) -> Result<(), BackupError> {
    let deadline = Instant::now() + timeout;

    loop {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => {
                debug!(id = identifier, path = %path.display(), "Found backup directory");
                return Ok(());
            }
            Ok(_) => {
                return Err(BackupError::NotADirectory {
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(BackupError::Stat {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(BackupError::Timeout {
                path: path.to_path_buf(),
                timeout,
            });
        }

        debug!(id = identifier, path = %path.display(), "Waiting for save folder to be created");
        tokio::select! {
            _ = cancel.cancelled() => return Err(BackupError::Cancelled),
            _ = sleep(poll_interval.min(deadline - now)) => {}
        }
    }
}

/// Create the safe-backup directory (and parents) if it is missing.
pub async fn ensure_safe_dir(path: &Path) -> Result<(), BackupError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| BackupError::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn succeeds_once_directory_appears() -> Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("autosave");
        let cancel = CancellationToken::new();

        let creator = {
            let target = target.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(50)).await;
                fs::create_dir_all(target)
            })
        };

        wait_for_directory(&target, POLL, Duration::from_secs(5), &cancel, "[test]").await?;
        creator.await??;
        Ok(())
    }

    #[tokio::test]
    async fn rejects_regular_file() -> Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("autosave");
        fs::write(&target, b"not a dir")?;

        let cancel = CancellationToken::new();
        let err = wait_for_directory(&target, POLL, Duration::from_secs(1), &cancel, "[test]")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotADirectory { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn times_out() -> Result<()> {
        let dir = tempdir()?;
        let err = wait_for_directory(
            &dir.path().join("missing"),
            POLL,
            Duration::from_millis(40),
            &CancellationToken::new(),
            "[test]",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackupError::Timeout { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_unblocks_the_wait() -> Result<()> {
        let dir = tempdir()?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_directory(
            &dir.path().join("missing"),
            Duration::from_secs(60),
            Duration::from_secs(600),
            &cancel,
            "[test]",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackupError::Cancelled));
        Ok(())
    }

    #[tokio::test]
    async fn creates_nested_safe_dir() -> Result<()> {
        let dir = tempdir()?;
        let safe = dir.path().join("saves/Mars/Safebackups");
        ensure_safe_dir(&safe).await?;
        assert!(safe.is_dir());
        Ok(())
    }
}
