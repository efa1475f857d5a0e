//! Reload orchestration for dev plugins.
//!
//! A reload re-reads `plugin.json` from the build output (the artifact that
//! actually runs), marks it as a dev build and hands it to the plugin manager
//! for a hot swap. Failures are reported and never retried.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;

use super::{DevError, DevPluginManager, DevResult};
use crate::plugin::MetadataWithDirectory;

/// Result of a reload pass over every loaded dev plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub reloaded: Vec<String>,
    pub failed: Vec<String>,
}

impl ReloadReport {
    pub fn total(&self) -> usize {
        self.reloaded.len() + self.failed.len()
    }
}

impl DevPluginManager {
    /// Arm (or re-arm) the debounced reload of `id`.
    ///
    /// This is what the build output watcher calls for every relevant event.
    pub fn schedule_reload(&self, id: &str, reason: &'static str) {
        let weak = Arc::downgrade(&self.inner);
        let plugin = id.to_string();
        tracing::debug!(
            plugin = %plugin,
            delay_ms = self.inner.debouncer.delay().as_millis() as u64,
            "Scheduling reload"
        );

        self.inner.debouncer.trigger(plugin.clone(), move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // Errors are already logged and notified.
            let _ = DevPluginManager { inner }.reload_by_id(&plugin, reason).await;
        });
    }

    /// Hot-swap the running instance of a loaded dev plugin.
    pub async fn reload_by_id(&self, id: &str, reason: &str) -> DevResult<()> {
        let Some(source) = self.get(id) else {
            tracing::warn!(plugin = %id, reason, "Reload requested for an unloaded plugin");
            return Err(DevError::UnknownPlugin(id.to_string()));
        };
        self.reload_plugin(&source, reason).await
    }

    /// Rebuild metadata from `source`'s build output and swap it in.
    ///
    /// Reloads of one identity never overlap.
    pub async fn reload_plugin(
        &self,
        source: &MetadataWithDirectory,
        reason: &str,
    ) -> DevResult<()> {
        let lock = self.reload_lock(source.id());
        let _guard = lock.lock().await;

        let name = &source.metadata.name;
        tracing::info!(plugin = %source.id(), name = %name, reason, "Reloading dev plugin");

        match self.swap_in(source).await {
            Ok(()) => {
                tracing::info!(plugin = %source.id(), name = %name, "Reloaded dev plugin");
                self.inner.host.notify(&format!("Reloaded {name} ({reason})"));
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    plugin = %source.id(),
                    name = %name,
                    error = %e,
                    "Failed to reload dev plugin"
                );
                self.inner.host.notify(&format!("Failed to reload {name}: {e}"));
                Err(e)
            }
        }
    }

    async fn swap_in(&self, source: &MetadataWithDirectory) -> DevResult<()> {
        let dist = source.directory.join(&self.inner.config.dist_dir);
        check_dist(&dist)?;

        let metadata = self.inner.plugins.parse_metadata(&dist)?;
        let mut artifact = MetadataWithDirectory::new(metadata, dist);
        artifact.is_dev = true;
        artifact.dev_plugin_directory = Some(source.directory.clone());

        self.inner.plugins.reload_plugin(artifact).await?;
        Ok(())
    }

    /// Reload every loaded dev plugin concurrently.
    pub async fn reload_all(&self, reason: &str) -> ReloadReport {
        let sources = self.loaded();
        let total = sources.len();
        let progress = &self.inner.progress;
        progress.begin(format!("Reloading {total} dev plugins"));
        progress.update(format!("0/{total}"));

        let mut pending: FuturesUnordered<_> = sources
            .iter()
            .map(|source| async move { (source.id(), self.reload_plugin(source, reason).await) })
            .collect();

        let mut report = ReloadReport::default();
        while let Some((id, result)) = pending.next().await {
            match result {
                Ok(()) => report.reloaded.push(id.to_string()),
                Err(_) => report.failed.push(id.to_string()),
            }
            progress.update(format!("{}/{total}", report.total()));
        }

        progress.finish(format!("Reloaded {} of {total} dev plugins", report.reloaded.len()));
        tracing::info!(
            reloaded = report.reloaded.len(),
            failed = report.failed.len(),
            reason,
            "Dev plugin reload pass done"
        );
        report
    }

    /// Re-read the persisted directories, then reload everything.
    pub async fn full_reload(&self, reason: &str) -> DevResult<ReloadReport> {
        self.load_all()?;
        Ok(self.reload_all(reason).await)
    }

    /// Two-phase bring-up: load now, force-reload once after the grace period.
    ///
    /// The returned task finishes after the delayed pass.
    pub fn start(&self) -> JoinHandle<()> {
        if let Err(e) = self.load_all() {
            tracing::error!(error = %e, "Failed to load dev plugins on startup");
        }

        let delay = self.inner.config.startup_reload_delay();
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                DevPluginManager { inner }.reload_all("reload after startup").await;
            }
        })
    }

    fn reload_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.inner.reload_locks.lock().entry(id.to_string()).or_default())
    }
}

fn check_dist(dist: &Path) -> DevResult<()> {
    std::fs::metadata(dist)
        .map(|_| ())
        .map_err(|e| DevError::MissingDist { path: dist.to_path_buf(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::core::DevConfig;
    use crate::dev::fixtures::write_dev_plugin;
    use crate::host::RecordingHost;
    use crate::plugin::{Metadata, PluginError, PluginInstance, PluginManager, PluginResult};
    use crate::settings::{JsonSettingsStore, SettingsStore};

    /// Records swaps and tracks how many overlap.
    #[derive(Default)]
    struct SlowPlugins {
        swaps: Mutex<Vec<MetadataWithDirectory>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        reject: Mutex<Option<String>>,
    }

    #[async_trait]
    impl PluginManager for SlowPlugins {
        fn parse_metadata(&self, directory: &Path) -> PluginResult<Metadata> {
            Metadata::from_directory(directory)
        }

        async fn reload_plugin(&self, metadata: MetadataWithDirectory) -> PluginResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(reason) = self.reject.lock().clone() {
                return Err(PluginError::Rejected { id: metadata.id().to_string(), reason });
            }
            self.swaps.lock().push(metadata);
            Ok(())
        }

        fn plugin_instances(&self) -> Vec<PluginInstance> {
            Vec::new()
        }
    }

    struct Fixture {
        _root: TempDir,
        root: PathBuf,
        plugins: Arc<SlowPlugins>,
        host: Arc<RecordingHost>,
        settings: Arc<JsonSettingsStore>,
        manager: DevPluginManager,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let plugins = Arc::new(SlowPlugins::default());
        let host = Arc::new(RecordingHost::new());
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let manager = DevPluginManager::new(
            plugins.clone(),
            settings.clone(),
            host.clone(),
            DevConfig::default(),
        )
        .unwrap();
        Fixture { _root: temp, root, plugins, host, settings, manager }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_reads_build_output() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        f.manager.load_directory(&source).unwrap();

        f.manager.reload_by_id("calendar-id", "reload by user").await.unwrap();

        let swaps = f.plugins.swaps.lock().clone();
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].directory, source.join("dist"));
        assert!(swaps[0].is_dev);
        assert_eq!(swaps[0].dev_plugin_directory.as_deref(), Some(source.as_path()));
        assert_eq!(f.host.notifications(), vec!["Reloaded calendar (reload by user)".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_dist_aborts_reload() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        std::fs::remove_dir_all(source.join("dist")).unwrap();
        f.manager.load_directory(&source).unwrap();

        let err = f.manager.reload_by_id("calendar-id", "reload by user").await.unwrap_err();

        assert!(matches!(err, DevError::MissingDist { .. }));
        assert!(f.plugins.swaps.lock().is_empty());
        assert!(f.host.notifications()[0].starts_with("Failed to reload calendar:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_swap_is_reported() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        f.manager.load_directory(&source).unwrap();
        *f.plugins.reject.lock() = Some("runtime not ready".to_string());

        let err = f.manager.reload_by_id("calendar-id", "reload by user").await.unwrap_err();

        assert!(matches!(err, DevError::Plugin(PluginError::Rejected { .. })));
        assert!(f.host.notifications()[0].contains("runtime not ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_plugin() {
        let f = fixture();
        let err = f.manager.reload_by_id("nope", "reload by user").await.unwrap_err();
        assert!(matches!(err, DevError::UnknownPlugin(id) if id == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_identity_reloads_are_serialized() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        f.manager.load_directory(&source).unwrap();

        let (a, b) = tokio::join!(
            f.manager.reload_by_id("calendar-id", "first"),
            f.manager.reload_by_id("calendar-id", "second"),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(f.plugins.swaps.lock().len(), 2);
        assert_eq!(f.plugins.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_identities_reload_concurrently() {
        let f = fixture();
        for (name, id) in [("calendar", "calendar-id"), ("notes", "notes-id")] {
            let source = write_dev_plugin(&f.root, name, id);
            f.manager.load_directory(&source).unwrap();
        }

        let report = f.manager.reload_all("reload by user").await;

        assert_eq!(report.reloaded.len(), 2);
        assert_eq!(f.plugins.max_in_flight.load(Ordering::SeqCst), 2);
        let progress = f.manager.progress().snapshot();
        assert!(!progress.running);
        assert_eq!(progress.subtitle, "2/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_burst_reloads_once() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        f.manager.load_directory(&source).unwrap();

        for _ in 0..3 {
            f.manager.schedule_reload("calendar-id", "dist directory changed");
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(f.manager.has_pending_reload("calendar-id"));

        // 200ms already elapsed since the last trigger.
        tokio::time::sleep(Duration::from_millis(1700)).await;
        assert!(f.plugins.swaps.lock().is_empty());

        // Timer fires at +2000ms, the swap takes 100ms.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(f.plugins.swaps.lock().len(), 1);
        assert!(!f.manager.has_pending_reload("calendar-id"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reloads_after_grace_period() {
        let f = fixture();
        let source = write_dev_plugin(&f.root, "calendar", "calendar-id");
        let stored = crate::dev::encode_directory_list(&[source]).unwrap();
        f.settings.save_setting(crate::dev::LOCAL_PLUGIN_DIRECTORIES_KEY, &stored).unwrap();

        let pass = f.manager.start();
        assert_eq!(f.manager.loaded().len(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(f.plugins.swaps.lock().is_empty());

        pass.await.unwrap();
        assert_eq!(f.plugins.swaps.lock().len(), 1);
        assert_eq!(
            f.host.notifications(),
            vec!["Reloaded calendar (reload after startup)".to_string()]
        );
    }
}
