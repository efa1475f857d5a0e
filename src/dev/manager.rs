//! Dev plugin manager.
//!
//! All registry mutations (startup load, user commands, watcher-triggered
//! reloads) go through one [`DevPluginManager`]. The registry sits behind a
//! single mutex that is held for the whole of each mutation, which keeps at
//! most one watcher and one pending reload timer per plugin identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::registry::{encode_directory_list, parse_directory_list, DevRegistry};
use super::{
    Debouncer, DevError, DevPluginEntry, DevResult, DistWatcher, LOCAL_PLUGIN_DIRECTORIES_KEY,
};
use crate::core::DevConfig;
use crate::host::HostServices;
use crate::plugin::{MetadataWithDirectory, PluginManager};
use crate::result::ProgressTracker;
use crate::settings::SettingsStore;

/// Outcome of adding a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Registered; carries the plugin identity if its metadata loaded.
    Added(Option<String>),
    AlreadyAdded,
}

/// Outcome of removing a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// What a load pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<PathBuf>,
    pub pruned: Vec<PathBuf>,
}

pub(super) struct Inner {
    pub(super) plugins: Arc<dyn PluginManager>,
    pub(super) settings: Arc<dyn SettingsStore>,
    pub(super) host: Arc<dyn HostServices>,
    pub(super) config: DevConfig,
    pub(super) registry: Mutex<DevRegistry>,
    pub(super) debouncer: Debouncer<String>,
    pub(super) reload_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    pub(super) progress: ProgressTracker,
    pub(super) runtime: Handle,
}

/// Loads, watches and hot-reloads plugins from local working directories.
#[derive(Clone)]
pub struct DevPluginManager {
    pub(super) inner: Arc<Inner>,
}

impl std::fmt::Debug for DevPluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("DevPluginManager")
            .field("directories", &registry.directories())
            .field("loaded", &registry.entries().len())
            .finish()
    }
}

impl DevPluginManager {
    /// Create a manager bound to the current tokio runtime.
    pub fn new(
        plugins: Arc<dyn PluginManager>,
        settings: Arc<dyn SettingsStore>,
        host: Arc<dyn HostServices>,
        config: DevConfig,
    ) -> DevResult<Self> {
        let runtime = Handle::try_current().map_err(|e| DevError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(plugins, settings, host, config, runtime))
    }

    /// Create a manager whose timers run on `runtime`.
    pub fn with_runtime(
        plugins: Arc<dyn PluginManager>,
        settings: Arc<dyn SettingsStore>,
        host: Arc<dyn HostServices>,
        config: DevConfig,
        runtime: Handle,
    ) -> Self {
        let debouncer = Debouncer::new(config.debounce(), runtime.clone());
        Self {
            inner: Arc::new(Inner {
                plugins,
                settings,
                host,
                config,
                registry: Mutex::new(DevRegistry::default()),
                debouncer,
                reload_locks: Mutex::new(HashMap::new()),
                progress: ProgressTracker::new(),
                runtime,
            }),
        }
    }

    /// Registered directories, in registration order.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.inner.registry.lock().directories().to_vec()
    }

    /// Metadata of every loaded dev plugin.
    pub fn loaded(&self) -> Vec<MetadataWithDirectory> {
        self.inner.registry.lock().entries().iter().map(|e| e.metadata.clone()).collect()
    }

    /// Metadata of one loaded dev plugin.
    pub fn get(&self, id: &str) -> Option<MetadataWithDirectory> {
        self.inner.registry.lock().get(id).map(|e| e.metadata.clone())
    }

    /// Whether the plugin's build output is being watched.
    pub fn is_watching(&self, id: &str) -> bool {
        self.inner.registry.lock().get(id).is_some_and(DevPluginEntry::is_watching)
    }

    /// Whether a debounced reload is waiting to fire for `id`.
    pub fn has_pending_reload(&self, id: &str) -> bool {
        self.inner.debouncer.is_pending(&id.to_string())
    }

    /// Progress of the current full reload pass.
    pub fn progress(&self) -> ProgressTracker {
        self.inner.progress.clone()
    }

    /// Parse and register the plugin in `directory`, watching its build output.
    ///
    /// A plugin already loaded under the same identity (or from the same
    /// directory) is unloaded first.
    pub fn load_directory(&self, directory: &Path) -> DevResult<String> {
        self.load_entry(directory, false)
    }

    /// With `registered_only`, the entry is dropped when `directory` left the
    /// directory list while its metadata was being parsed.
    fn load_entry(&self, directory: &Path, registered_only: bool) -> DevResult<String> {
        tracing::info!(directory = %directory.display(), "Loading dev plugin");
        let metadata = self.inner.plugins.parse_metadata(directory).map_err(|e| {
            tracing::error!(
                directory = %directory.display(),
                error = %e,
                "Failed to load dev plugin"
            );
            e
        })?;
        let metadata = MetadataWithDirectory::new(metadata, directory.to_path_buf());
        let id = metadata.id().to_string();

        let mut registry = self.inner.registry.lock();
        if registered_only && !registry.contains_directory(directory) {
            tracing::info!(
                directory = %directory.display(),
                "Dev plugin directory removed while loading"
            );
            return Err(DevError::NotRegistered(directory.to_path_buf()));
        }
        for previous in registry.take_conflicting(&id, directory) {
            tracing::info!(plugin = %previous.id(), "Dev plugin already loaded, unloading first");
            self.inner.debouncer.cancel(&previous.id().to_string());
        }

        let watcher = self.watch_build_output(&id, directory);
        registry.insert(DevPluginEntry { metadata, watcher, loaded_at: Local::now() });
        Ok(id)
    }

    /// Stop watching `directory` and forget its entry. Files are untouched.
    pub fn unload_directory(&self, directory: &Path) -> bool {
        let removed = self.inner.registry.lock().take_by_directory(directory);
        match removed {
            Some(entry) => {
                self.inner.debouncer.cancel(&entry.id().to_string());
                tracing::info!(plugin = %entry.id(), "Unloaded dev plugin");
                true
            }
            None => false,
        }
    }

    /// Load every persisted directory, pruning the ones that no longer exist.
    ///
    /// Entries whose directory is no longer registered are unloaded.
    pub fn load_all(&self) -> DevResult<LoadSummary> {
        let stored = self.inner.settings.get_setting(LOCAL_PLUGIN_DIRECTORIES_KEY);
        let stored = parse_directory_list(&stored).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse dev plugin directories");
            e
        })?;

        let mut summary = LoadSummary::default();
        let mut directories: Vec<PathBuf> = Vec::with_capacity(stored.len());
        for directory in &stored {
            if let Err(e) = std::fs::metadata(directory) {
                tracing::warn!(
                    directory = %directory.display(),
                    error = %e,
                    "Dev plugin directory is gone, removing it"
                );
                if let Err(e) = std::fs::remove_dir_all(directory) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::error!(
                            directory = %directory.display(),
                            error = %e,
                            "Failed to delete stale directory"
                        );
                    }
                }
                summary.pruned.push(directory.clone());
                continue;
            }
            if !directories.contains(directory) {
                directories.push(directory.clone());
            }
        }

        let changed = directories != stored;
        {
            let mut registry = self.inner.registry.lock();
            for entry in registry.set_directories(directories.clone()) {
                self.inner.debouncer.cancel(&entry.id().to_string());
                tracing::info!(plugin = %entry.id(), "Unloaded dev plugin");
            }
        }
        if changed {
            self.save_directories(&directories)?;
        }

        for directory in &directories {
            match self.load_entry(directory, true) {
                Ok(id) => summary.loaded.push(id),
                Err(_) => summary.failed.push(directory.clone()),
            }
        }

        tracing::info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            pruned = summary.pruned.len(),
            "Loaded dev plugins"
        );
        Ok(summary)
    }

    /// Register a directory, persist the list and load it.
    pub fn add_directory(&self, directory: &Path) -> DevResult<AddOutcome> {
        let directories = {
            let mut registry = self.inner.registry.lock();
            if !registry.add_directory(directory) {
                return Ok(AddOutcome::AlreadyAdded);
            }
            registry.directories().to_vec()
        };

        tracing::info!(directory = %directory.display(), "Added dev plugin directory");
        self.save_directories(&directories)?;
        Ok(AddOutcome::Added(self.load_entry(directory, true).ok()))
    }

    /// Unregister a directory, optionally deleting it from disk.
    ///
    /// The entry is unloaded before anything is deleted so the watcher does
    /// not see the deletion. A failed delete puts the entry back.
    pub fn remove_directory(&self, directory: &Path, delete: bool) -> DevResult<RemoveOutcome> {
        let mut registry = self.inner.registry.lock();
        if !registry.contains_directory(directory) {
            return Ok(RemoveOutcome::NotFound);
        }

        let mut taken = registry.take_by_directory(directory);
        if let Some(entry) = taken.as_mut() {
            self.inner.debouncer.cancel(&entry.id().to_string());
            entry.watcher = None;
            tracing::info!(plugin = %entry.id(), "Unloaded dev plugin");
        }
        if delete {
            if let Err(e) = std::fs::remove_dir_all(directory) {
                tracing::error!(
                    directory = %directory.display(),
                    error = %e,
                    "Failed to delete plugin directory"
                );
                if let Some(mut entry) = taken {
                    entry.watcher = self.watch_build_output(entry.id(), directory);
                    registry.insert(entry);
                }
                return Err(e.into());
            }
        }
        registry.remove_directory(directory);
        let directories = registry.directories().to_vec();
        drop(registry);

        self.save_directories(&directories)?;
        tracing::info!(
            directory = %directory.display(),
            deleted = delete,
            "Removed dev plugin directory"
        );
        Ok(RemoveOutcome::Removed)
    }

    fn save_directories(&self, directories: &[PathBuf]) -> DevResult<()> {
        let value = encode_directory_list(directories)?;
        self.inner.settings.save_setting(LOCAL_PLUGIN_DIRECTORIES_KEY, &value)?;
        Ok(())
    }

    fn watch_build_output(&self, id: &str, directory: &Path) -> Option<DistWatcher> {
        let dist = directory.join(&self.inner.config.dist_dir);
        if dist.is_dir() {
            self.install_watcher(id, &dist)
        } else {
            None
        }
    }

    fn install_watcher(&self, id: &str, dist: &Path) -> Option<DistWatcher> {
        let weak = Arc::downgrade(&self.inner);
        let id = id.to_string();
        let watched = DistWatcher::watch(dist, move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::debug!(plugin = %id, kind = ?event.kind, "Dist directory changed");
            DevPluginManager { inner }.schedule_reload(&id, "dist directory changed");
        });

        match watched {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Failed to watch dist directory");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::fixtures::write_dev_plugin;
    use crate::host::RecordingHost;
    use crate::plugin::LocalPluginManager;
    use crate::settings::JsonSettingsStore;
    use tempfile::TempDir;

    fn manager() -> (DevPluginManager, Arc<JsonSettingsStore>) {
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let manager = DevPluginManager::new(
            Arc::new(LocalPluginManager::new()),
            settings.clone(),
            Arc::new(RecordingHost::new()),
            DevConfig::default(),
        )
        .unwrap();
        (manager, settings)
    }

    #[tokio::test]
    async fn test_reloading_identity_keeps_one_entry() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager();
        let first = write_dev_plugin(root.path(), "calendar", "calendar-id");
        let second = write_dev_plugin(root.path(), "calendar-copy", "calendar-id");

        manager.load_directory(&first).unwrap();
        manager.load_directory(&first).unwrap();
        assert_eq!(manager.loaded().len(), 1);

        // Same identity from another directory replaces the first entry.
        manager.load_directory(&second).unwrap();
        let loaded = manager.loaded();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].directory, second);
        assert!(manager.is_watching("calendar-id"));
    }

    #[tokio::test]
    async fn test_load_without_dist_is_not_watched() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");
        std::fs::remove_dir_all(source.join("dist")).unwrap();

        manager.load_directory(&source).unwrap();

        assert!(manager.get("calendar-id").is_some());
        assert!(!manager.is_watching("calendar-id"));
    }

    #[tokio::test]
    async fn test_load_all_prunes_and_dedupes() {
        let root = TempDir::new().unwrap();
        let (manager, settings) = manager();
        let calendar = write_dev_plugin(root.path(), "calendar", "calendar-id");
        let broken = root.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        let gone = root.path().join("gone");

        let stored = encode_directory_list(&[
            calendar.clone(),
            gone.clone(),
            calendar.clone(),
            broken.clone(),
        ])
        .unwrap();
        settings.save_setting(LOCAL_PLUGIN_DIRECTORIES_KEY, &stored).unwrap();

        let summary = manager.load_all().unwrap();

        assert_eq!(summary.loaded, vec!["calendar-id"]);
        assert_eq!(summary.failed, vec![broken.clone()]);
        assert_eq!(summary.pruned, vec![gone]);
        assert_eq!(manager.directories(), vec![calendar.clone(), broken.clone()]);
        let saved =
            parse_directory_list(&settings.get_setting(LOCAL_PLUGIN_DIRECTORIES_KEY)).unwrap();
        assert_eq!(saved, vec![calendar, broken]);
    }

    #[tokio::test]
    async fn test_load_all_rejects_corrupt_list() {
        let (manager, settings) = manager();
        settings.save_setting(LOCAL_PLUGIN_DIRECTORIES_KEY, "not json").unwrap();
        assert!(matches!(manager.load_all(), Err(DevError::DirectoryList(_))));
    }

    #[tokio::test]
    async fn test_add_and_remove_directory() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");

        assert_eq!(
            manager.add_directory(&source).unwrap(),
            AddOutcome::Added(Some("calendar-id".into()))
        );
        assert_eq!(manager.add_directory(&source).unwrap(), AddOutcome::AlreadyAdded);

        assert_eq!(manager.remove_directory(&source, true).unwrap(), RemoveOutcome::Removed);
        assert!(!source.exists());
        assert!(manager.loaded().is_empty());
        assert_eq!(manager.remove_directory(&source, false).unwrap(), RemoveOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_load_all_unloads_vanished_directory() {
        let root = TempDir::new().unwrap();
        let (manager, settings) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");
        manager.add_directory(&source).unwrap();
        assert!(manager.is_watching("calendar-id"));

        std::fs::remove_dir_all(&source).unwrap();
        let summary = manager.load_all().unwrap();

        assert_eq!(summary.pruned, vec![source]);
        assert!(manager.directories().is_empty());
        assert!(manager.loaded().is_empty());
        assert!(!manager.is_watching("calendar-id"));
        let saved =
            parse_directory_list(&settings.get_setting(LOCAL_PLUGIN_DIRECTORIES_KEY)).unwrap();
        assert!(saved.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_directory_is_not_inserted() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");

        // Same state as a removal landing between registration and load.
        let result = manager.load_entry(&source, true);

        assert!(matches!(result, Err(DevError::NotRegistered(_))));
        assert!(manager.loaded().is_empty());
        assert!(!manager.is_watching("calendar-id"));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_plugin_registered() {
        let root = TempDir::new().unwrap();
        let (manager, settings) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");
        manager.add_directory(&source).unwrap();

        // A plain file cannot be removed as a directory.
        std::fs::remove_dir_all(&source).unwrap();
        std::fs::write(&source, "not a directory").unwrap();

        assert!(manager.remove_directory(&source, true).is_err());
        assert!(source.is_file());
        assert_eq!(manager.directories(), vec![source.clone()]);
        assert!(manager.get("calendar-id").is_some());
        let saved =
            parse_directory_list(&settings.get_setting(LOCAL_PLUGIN_DIRECTORIES_KEY)).unwrap();
        assert_eq!(saved, vec![source]);
    }

    #[tokio::test]
    async fn test_unwatchable_build_output_stays_registered() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager();
        let source = write_dev_plugin(root.path(), "calendar", "calendar-id");
        std::fs::remove_dir_all(source.join("dist")).unwrap();
        std::fs::write(source.join("dist"), "build output").unwrap();

        assert_eq!(
            manager.add_directory(&source).unwrap(),
            AddOutcome::Added(Some("calendar-id".into()))
        );
        assert_eq!(manager.directories(), vec![source]);
        assert!(manager.get("calendar-id").is_some());
        assert!(!manager.is_watching("calendar-id"));
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = DevPluginManager::new(
            Arc::new(LocalPluginManager::new()),
            Arc::new(JsonSettingsStore::in_memory()),
            Arc::new(RecordingHost::new()),
            DevConfig::default(),
        );
        assert!(matches!(result, Err(DevError::NoRuntime(_))));
    }
}
