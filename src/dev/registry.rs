//! Table of dev plugin directories and loaded entries.
//!
//! Pure bookkeeping. [`super::DevPluginManager`] owns the only instance
//! behind a mutex and does all I/O around it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::DistWatcher;
use crate::plugin::MetadataWithDirectory;

/// Setting key of the persisted directory list.
pub const LOCAL_PLUGIN_DIRECTORIES_KEY: &str = "local_plugin_directories";

/// One persisted directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPluginRecord {
    #[serde(rename = "Path")]
    pub path: PathBuf,
}

/// Parse the persisted directory list. An empty value is an empty list.
pub fn parse_directory_list(value: &str) -> Result<Vec<PathBuf>, serde_json::Error> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<LocalPluginRecord> = serde_json::from_str(value)?;
    Ok(records.into_iter().map(|r| r.path).collect())
}

/// Encode the directory list for persistence.
pub fn encode_directory_list(directories: &[PathBuf]) -> Result<String, serde_json::Error> {
    let records: Vec<LocalPluginRecord> =
        directories.iter().map(|path| LocalPluginRecord { path: path.clone() }).collect();
    serde_json::to_string(&records)
}

/// A loaded dev plugin.
#[derive(Debug)]
pub struct DevPluginEntry {
    /// Metadata parsed from the source directory.
    pub metadata: MetadataWithDirectory,
    pub(super) watcher: Option<DistWatcher>,
    pub loaded_at: DateTime<Local>,
}

impl DevPluginEntry {
    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    pub fn directory(&self) -> &Path {
        &self.metadata.directory
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }
}

#[derive(Debug, Default)]
pub(super) struct DevRegistry {
    directories: Vec<PathBuf>,
    entries: Vec<DevPluginEntry>,
}

impl DevRegistry {
    pub(super) fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Replace the directory list and take out the entries left without one.
    pub(super) fn set_directories(&mut self, directories: Vec<PathBuf>) -> Vec<DevPluginEntry> {
        self.directories = directories;
        let (orphaned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| !self.directories.iter().any(|d| d == e.directory()));
        self.entries = kept;
        orphaned
    }

    pub(super) fn contains_directory(&self, directory: &Path) -> bool {
        self.directories.iter().any(|d| d == directory)
    }

    /// Returns false when already present.
    pub(super) fn add_directory(&mut self, directory: &Path) -> bool {
        if self.contains_directory(directory) {
            return false;
        }
        self.directories.push(directory.to_path_buf());
        true
    }

    /// Returns false when absent.
    pub(super) fn remove_directory(&mut self, directory: &Path) -> bool {
        let before = self.directories.len();
        self.directories.retain(|d| d != directory);
        self.directories.len() != before
    }

    pub(super) fn entries(&self) -> &[DevPluginEntry] {
        &self.entries
    }

    pub(super) fn get(&self, id: &str) -> Option<&DevPluginEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Take out every entry that would collide with `id` or `directory`.
    pub(super) fn take_conflicting(&mut self, id: &str, directory: &Path) -> Vec<DevPluginEntry> {
        let (conflicting, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.id() == id || e.directory() == directory);
        self.entries = kept;
        conflicting
    }

    pub(super) fn insert(&mut self, entry: DevPluginEntry) {
        self.entries.push(entry);
    }

    pub(super) fn take_by_directory(&mut self, directory: &Path) -> Option<DevPluginEntry> {
        let index = self.entries.iter().position(|e| e.directory() == directory)?;
        Some(self.entries.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Metadata;

    fn entry(id: &str, directory: &str) -> DevPluginEntry {
        let metadata = Metadata {
            id: id.to_string(),
            name: id.to_string(),
            author: String::new(),
            version: "1.0.0".to_string(),
            min_host_version: String::new(),
            runtime: "nodejs".to_string(),
            entry: String::new(),
            description: String::new(),
            website: String::new(),
            icon: String::new(),
            trigger_keywords: Vec::new(),
            commands: Vec::new(),
            supported_os: Vec::new(),
            features: Vec::new(),
        };
        DevPluginEntry {
            metadata: MetadataWithDirectory::new(metadata, PathBuf::from(directory)),
            watcher: None,
            loaded_at: Local::now(),
        }
    }

    #[test]
    fn test_directory_list_format() {
        let dirs = vec![PathBuf::from("/src/calendar"), PathBuf::from("/src/notes")];
        let encoded = encode_directory_list(&dirs).unwrap();
        assert_eq!(encoded, r#"[{"Path":"/src/calendar"},{"Path":"/src/notes"}]"#);
        assert_eq!(parse_directory_list(&encoded).unwrap(), dirs);
        assert!(parse_directory_list("").unwrap().is_empty());
        assert!(parse_directory_list("{").is_err());
    }

    #[test]
    fn test_add_directory_is_idempotent() {
        let mut registry = DevRegistry::default();
        assert!(registry.add_directory(Path::new("/src/calendar")));
        assert!(!registry.add_directory(Path::new("/src/calendar")));
        assert_eq!(registry.directories().len(), 1);

        assert!(registry.remove_directory(Path::new("/src/calendar")));
        assert!(!registry.remove_directory(Path::new("/src/calendar")));
    }

    #[test]
    fn test_set_directories_takes_orphaned_entries() {
        let mut registry = DevRegistry::default();
        registry.set_directories(vec![PathBuf::from("/src/calendar"), PathBuf::from("/src/notes")]);
        registry.insert(entry("calendar", "/src/calendar"));
        registry.insert(entry("notes", "/src/notes"));

        let orphaned = registry.set_directories(vec![PathBuf::from("/src/notes")]);
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].id(), "calendar");
        assert!(registry.get("calendar").is_none());
        assert!(registry.get("notes").is_some());
    }

    #[test]
    fn test_take_conflicting_by_identity_or_directory() {
        let mut registry = DevRegistry::default();
        registry.insert(entry("calendar", "/src/calendar"));
        registry.insert(entry("notes", "/src/notes"));
        registry.insert(entry("todo", "/src/todo"));

        let taken = registry.take_conflicting("calendar", Path::new("/src/notes"));
        assert_eq!(taken.len(), 2);
        assert_eq!(registry.entries().len(), 1);
        assert!(registry.get("todo").is_some());
    }
}
