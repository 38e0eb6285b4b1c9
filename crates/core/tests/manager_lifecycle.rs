use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::{bail, Result};
use sbm_core::{
    backup::{BackupConfig, BackupKind, BackupManager, ManagerHandle, ManagerRegistry, ManagerState},
    BackupError,
};
use tempfile::tempdir;
use tokio::time::{sleep, Instant};

fn config(root: &Path, settle: Duration) -> BackupConfig {
    BackupConfig::new("Mars", root.join("autosave"), root.join("Safebackups"))
        .with_settle_delay(settle)
        .with_readiness(Duration::from_millis(10), Duration::from_secs(10))
}

async fn wait_for(path: &Path, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if path.exists() {
            return Ok(());
        }
        sleep(Duration::from_millis(20)).await;
    }
    bail!("{} never appeared", path.display())
}

async fn wait_for_state(manager: &BackupManager, state: ManagerState) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if manager.state() == state {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }
    bail!("manager stuck in {}", manager.state())
}

fn touch(path: &Path, secs: u64) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs))?;
    Ok(path.to_path_buf())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_autosave_is_mirrored_after_settle_delay() -> Result<()> {
    let dir = tempdir()?;
    let manager = Arc::new(BackupManager::new(config(dir.path(), Duration::from_millis(200))));

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start().await })
    };
    sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), ManagerState::Initializing);

    fs::create_dir_all(dir.path().join("autosave"))?;
    starter.await??;
    assert_eq!(manager.state(), ManagerState::Watching);

    fs::write(dir.path().join("autosave/save1.save"), b"world state")?;
    fs::write(dir.path().join("autosave/readme.txt"), b"ignored")?;

    let copied = dir.path().join("Safebackups/save1.save");
    wait_for(&copied, Duration::from_secs(10)).await?;
    assert_eq!(fs::read(&copied)?, b"world state");
    assert!(!dir.path().join("Safebackups/readme.txt").exists());

    let listed = manager.list_backups(0)?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].kind(), BackupKind::Dotsave);

    manager.shutdown().await;
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(manager.outstanding_work(), 0);
    Ok(())
}

#[test]
fn listing_is_sorted_limited_and_repeatable() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("autosave"))?;
    let safe = dir.path().join("Safebackups");
    for index in [3u64, 7, 5] {
        touch(&safe.join(format!("world({index}).bin")), index)?;
        touch(&safe.join(format!("world({index}).xml")), index)?;
        touch(&safe.join(format!("world_meta({index}).xml")), index)?;
    }
    // Incomplete set, never listed.
    touch(&safe.join("world(9).bin"), 9)?;
    touch(&safe.join("world(9).xml"), 9)?;

    let manager = BackupManager::new(config(dir.path(), Duration::from_secs(30)));

    let all = manager.list_backups(0)?;
    let indices: Vec<_> = all.iter().map(|group| group.index).collect();
    assert_eq!(indices, vec![7, 5, 3]);
    assert!(all.iter().all(|group| group.kind() == BackupKind::PreterrainTrio));

    let top = manager.list_backups(2)?;
    assert_eq!(top, all[..2].to_vec());

    assert_eq!(manager.list_backups(0)?, all);
    Ok(())
}

#[test]
fn listing_without_save_directory_is_not_ready() -> Result<()> {
    let dir = tempdir()?;
    let handle = ManagerHandle::with_manager(Arc::new(BackupManager::new(config(
        dir.path(),
        Duration::from_secs(30),
    ))));

    match handle.list_backups(0) {
        Err(err @ BackupError::SaveDirNotReady { .. }) => {
            assert!(err.to_string().contains("doesn't seem to exist"));
        }
        other => bail!("expected SaveDirNotReady, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_waits_for_in_flight_work_and_repoints_handles() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("autosave"))?;

    let registry = ManagerRegistry::new();
    let handle = ManagerHandle::new();
    registry.attach(&handle);

    let old = registry
        .reload(config(dir.path(), Duration::from_millis(400)))
        .await;
    wait_for_state(&old, ManagerState::Watching).await?;

    fs::write(dir.path().join("autosave/save2.save"), b"x")?;
    let deadline = Instant::now() + Duration::from_secs(10);
    while old.outstanding_work() < 2 && Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
    }
    assert!(old.outstanding_work() >= 2, "copy never scheduled");

    let new = registry
        .reload(config(dir.path(), Duration::from_millis(400)))
        .await;

    assert_eq!(old.state(), ManagerState::Stopped);
    assert_eq!(old.outstanding_work(), 0);
    assert_eq!(fs::read(dir.path().join("Safebackups/save2.save"))?, b"x");
    let current = handle.manager().expect("handle attached");
    assert!(Arc::ptr_eq(&current, &new));
    assert!(!Arc::ptr_eq(&current, &old));

    registry.shutdown().await;
    assert_eq!(new.state(), ManagerState::Stopped);
    Ok(())
}
