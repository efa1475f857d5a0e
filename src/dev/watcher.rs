//! Filesystem watch on a dev plugin's build output.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::{DevError, DevResult};

/// Whether an event should trigger a reload. Metadata-only changes and
/// access notifications are ignored.
pub fn is_reload_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_) | EventKind::Modify(ModifyKind::Metadata(_)))
}

/// An active watch. Dropping it stops watching.
pub struct DistWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl std::fmt::Debug for DistWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistWatcher").field("path", &self.path).finish()
    }
}

impl DistWatcher {
    /// Watch `path` recursively and call `on_change` for every relevant event.
    ///
    /// `on_change` runs on the watcher's own thread and must not block.
    pub fn watch<F>(path: &Path, on_change: F) -> DevResult<Self>
    where
        F: Fn(&Event) + Send + 'static,
    {
        let watched = path.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_reload_relevant(&event.kind) => on_change(&event),
                Ok(_) => {}
                Err(e) => tracing::error!(path = %watched.display(), error = %e, "Watch error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| watch_error(path, &e))?;

        watcher.watch(path, RecursiveMode::Recursive).map_err(|e| watch_error(path, &e))?;

        tracing::info!(path = %path.display(), "Watching dist directory");
        Ok(Self { _watcher: watcher, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn watch_error(path: &Path, error: &notify::Error) -> DevError {
    DevError::Watch { path: path.to_path_buf(), reason: error.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    #[test]
    fn test_metadata_and_access_events_are_ignored() {
        let permissions = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions));
        assert!(!is_reload_relevant(&permissions));
        assert!(!is_reload_relevant(&EventKind::Access(AccessKind::Read)));

        assert!(is_reload_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_reload_relevant(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_reload_relevant(&EventKind::Remove(notify::event::RemoveKind::File)));
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DistWatcher::watch(&dir.path().join("dist"), |_| {}).unwrap_err();
        assert!(matches!(err, DevError::Watch { .. }));
    }

    #[test]
    fn test_watch_reports_file_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let _watcher = DistWatcher::watch(dir.path(), move |event| {
            let _ = tx.send(event.kind);
        })
        .unwrap();

        std::fs::write(dir.path().join("index.js"), "module.exports = {}").unwrap();

        let kind = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
        assert!(is_reload_relevant(&kind));
    }
}
