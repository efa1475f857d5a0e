//! Settings collaborator.
//!
//! Plugins store their settings as flat string values keyed by name. The
//! values themselves are frequently JSON documents (the AI command table, the
//! list of dev plugin directories), but the store does not care.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Errors raised by the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Callback invoked with `(key, new_value)` after a setting is saved.
pub type SettingCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Operations consumed from the settings collaborator.
pub trait SettingsStore: Send + Sync {
    /// Get a setting, or an empty string when it was never saved.
    fn get_setting(&self, key: &str) -> String;

    /// Save a setting and notify listeners of `key`.
    fn save_setting(&self, key: &str, value: &str) -> SettingsResult<()>;

    /// Register a listener for changes of `key`.
    fn on_setting_changed(&self, key: &str, callback: SettingCallback);
}

/// Settings kept in memory and optionally mirrored to a JSON file.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, String>>,
    listeners: Mutex<Vec<(String, SettingCallback)>>,
}

impl std::fmt::Debug for JsonSettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSettingsStore")
            .field("path", &self.path)
            .field("keys", &self.values.read().len())
            .finish()
    }
}

impl JsonSettingsStore {
    /// Create a store that never touches disk.
    pub fn in_memory() -> Self {
        Self { path: None, values: RwLock::new(BTreeMap::new()), listeners: Mutex::new(Vec::new()) }
    }

    /// Open (or create on first save) a JSON settings file.
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| SettingsError::Corrupt {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> SettingsResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&*self.values.read())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_setting(&self, key: &str) -> String {
        self.values.read().get(key).cloned().unwrap_or_default()
    }

    fn save_setting(&self, key: &str, value: &str) -> SettingsResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        self.persist()?;

        // Listeners run outside the lock so they may read settings back.
        let listeners: Vec<SettingCallback> = self
            .listeners
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for listener in listeners {
            listener(key, value);
        }

        Ok(())
    }

    fn on_setting_changed(&self, key: &str, callback: SettingCallback) {
        self.listeners.lock().push((key.to_string(), callback));
    }
}
