//! Replacing the active manager when configuration changes.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{config::BackupConfig, handle::ManagerHandle, manager::BackupManager};

type Subscriber = Box<dyn Fn(&Arc<BackupManager>) + Send + Sync>;

/// Owns the active [`BackupManager`] and the consumers pointed at it.
///
/// Reloads are serialised by their own lock so a slow shutdown of the old
/// manager never blocks [`current`](Self::current).
pub struct ManagerRegistry {
    reload_lock: Mutex<()>,
    active: RwLock<Option<Arc<BackupManager>>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("active", &self.active.read().as_ref().map(|m| m.identifier().to_string()))
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerRegistry {
    /// Empty registry with no active manager.
    pub fn new() -> Self {
        Self {
            reload_lock: Mutex::new(()),
            active: RwLock::new(None),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Currently published manager, if any.
    pub fn current(&self) -> Option<Arc<BackupManager>> {
        self.active.read().clone()
    }

    /// Register a callback invoked with every newly published manager.
    ///
    /// If a manager is already active the callback is invoked immediately.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&Arc<BackupManager>) + Send + Sync + 'static,
    {
        // Reload publishes before it reads the list, so holding the list
        // while checking `active` cannot miss a manager.
        let mut subscribers = self.subscribers.write();
        if let Some(manager) = self.current() {
            subscriber(&manager);
        }
        subscribers.push(Box::new(subscriber));
    }

    /// Keep `handle` pointed at the active manager.
    pub fn attach(&self, handle: &ManagerHandle) {
        let handle = handle.clone();
        self.subscribe(move |manager| handle.repoint(Arc::clone(manager)));
    }

    /// Shut down the active manager, publish a new one built from `config`
    /// and start it in the background.
    ///
    /// Returns after the old manager has fully stopped and the new one has
    /// been handed to every subscriber.
    pub async fn reload(&self, config: BackupConfig) -> Arc<BackupManager> {
        let _reload = self.reload_lock.lock().await;

        if let Some(previous) = self.current() {
            info!(
                id = %config.identifier,
                previous = %previous.identifier(),
                "Previous backup manager found, shutting it down"
            );
            previous.shutdown().await;
        }

        info!(id = %config.identifier, world = %config.world_name, "Creating backup manager");
        let manager = Arc::new(BackupManager::new(config));
        *self.active.write() = Some(Arc::clone(&manager));

        for subscriber in self.subscribers.read().iter() {
            subscriber(&manager);
        }

        let starter = Arc::clone(&manager);
        tokio::spawn(async move {
            if let Err(err) = starter.start().await {
                error!(
                    id = %starter.identifier(),
                    error = %err,
                    label = err.as_label(),
                    "Backup manager exited"
                );
            }
        });

        debug!(id = %manager.identifier(), "Backup manager reloaded");
        manager
    }

    /// Shut down and unpublish the active manager.
    pub async fn shutdown(&self) {
        let _reload = self.reload_lock.lock().await;
        let previous = self.active.write().take();
        if let Some(manager) = previous {
            manager.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::ManagerState;
    use anyhow::Result;
    use std::{
        fs,
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tempfile::tempdir;

    fn test_config(root: &Path) -> BackupConfig {
        BackupConfig::new("Mars", root.join("autosave"), root.join("Safebackups"))
            .with_settle_delay(Duration::from_millis(20))
            .with_readiness(Duration::from_millis(10), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reload_replaces_and_notifies() -> Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("autosave"))?;
        let registry = ManagerRegistry::new();
        let notified = Arc::new(AtomicUsize::new(0));
        {
            let notified = Arc::clone(&notified);
            registry.subscribe(move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(registry.current().is_none());

        let first = registry.reload(test_config(dir.path())).await;
        let second = registry.reload(test_config(dir.path())).await;

        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert_eq!(first.state(), ManagerState::Stopped);
        assert_eq!(first.outstanding_work(), 0);
        let current = registry.current().expect("active manager");
        assert!(Arc::ptr_eq(&current, &second));

        registry.shutdown().await;
        assert!(registry.current().is_none());
        assert_eq!(second.state(), ManagerState::Stopped);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn attach_racing_reload_ends_on_current_manager() -> Result<()> {
        let dir = tempdir()?;
        let registry = Arc::new(ManagerRegistry::new());

        for _ in 0..50 {
            let handle = ManagerHandle::new();
            let reloading = {
                let registry = Arc::clone(&registry);
                let config = test_config(dir.path());
                tokio::spawn(async move { registry.reload(config).await })
            };
            let attaching = {
                let registry = Arc::clone(&registry);
                let handle = handle.clone();
                tokio::task::spawn_blocking(move || registry.attach(&handle))
            };
            reloading.await?;
            attaching.await?;

            let current = registry.current().expect("active manager");
            let attached = handle.manager().expect("handle repointed");
            assert!(Arc::ptr_eq(&attached, &current));
        }

        registry.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn late_subscriber_sees_active_manager() -> Result<()> {
        let dir = tempdir()?;
        let registry = ManagerRegistry::new();
        let manager = registry.reload(test_config(dir.path())).await;

        let handle = ManagerHandle::new();
        registry.attach(&handle);
        let attached = handle.manager().expect("handle repointed");
        assert!(Arc::ptr_eq(&attached, &manager));

        registry.shutdown().await;
        Ok(())
    }
}
