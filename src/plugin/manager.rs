//! Plugin manager seam and an in-process implementation.
//!
//! The host only needs three things from the plugin manager: parse a
//! descriptor, hot-swap a running instance and enumerate instances. How the
//! instance is actually hosted (node, python, ...) is not this crate's concern.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Metadata, MetadataWithDirectory, PluginError, PluginInstance, PluginResult};

/// Operations the host consumes from the plugin manager.
#[async_trait]
pub trait PluginManager: Send + Sync {
    /// Parse the plugin descriptor found in `directory`.
    fn parse_metadata(&self, directory: &Path) -> PluginResult<Metadata>;

    /// Replace the running instance with one built from `metadata`.
    ///
    /// On error the previous instance must be left untouched.
    async fn reload_plugin(&self, metadata: MetadataWithDirectory) -> PluginResult<()>;

    /// Snapshot of all running instances.
    fn plugin_instances(&self) -> Vec<PluginInstance>;
}

/// Keeps plugin instances in memory and swaps them atomically by identity.
#[derive(Debug, Default)]
pub struct LocalPluginManager {
    instances: RwLock<HashMap<String, PluginInstance>>,
}

impl LocalPluginManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in plugin.
    pub fn register_system(&self, metadata: MetadataWithDirectory) {
        let instance =
            PluginInstance { metadata, is_system: true, loaded_at: now_secs(), generation: 1 };
        self.instances.write().insert(instance.id().to_string(), instance);
    }

    /// Get a running instance by identity.
    pub fn get(&self, id: &str) -> Option<PluginInstance> {
        self.instances.read().get(id).cloned()
    }

    /// Number of running instances.
    pub fn count(&self) -> usize {
        self.instances.read().len()
    }

    /// Check that the artifact described by `metadata` can be started.
    fn prepare(metadata: &MetadataWithDirectory) -> PluginResult<()> {
        if !metadata.directory.is_dir() {
            return Err(PluginError::NotFound(metadata.directory.clone()));
        }

        if !metadata.metadata.entry.is_empty() {
            let entry = metadata.directory.join(&metadata.metadata.entry);
            if !entry.exists() {
                return Err(PluginError::LoadError {
                    id: metadata.id().to_string(),
                    reason: format!("entry file {} does not exist", entry.display()),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PluginManager for LocalPluginManager {
    fn parse_metadata(&self, directory: &Path) -> PluginResult<Metadata> {
        Metadata::from_directory(directory)
    }

    async fn reload_plugin(&self, metadata: MetadataWithDirectory) -> PluginResult<()> {
        Self::prepare(&metadata)?;

        let id = metadata.id().to_string();
        let mut instances = self.instances.write();

        let generation = match instances.get(&id) {
            Some(existing) if existing.is_system => {
                return Err(PluginError::Rejected {
                    id,
                    reason: "system plugins cannot be reloaded".to_string(),
                });
            }
            Some(existing) => existing.generation + 1,
            None => 1,
        };

        tracing::debug!(plugin = %id, generation, "Swapping plugin instance");
        instances.insert(
            id,
            PluginInstance { metadata, is_system: false, loaded_at: now_secs(), generation },
        );

        Ok(())
    }

    fn plugin_instances(&self) -> Vec<PluginInstance> {
        self.instances.read().values().cloned().collect()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
