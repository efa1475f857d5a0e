//! Core plugin types.

use serde::{Deserialize, Serialize};

use super::MetadataWithDirectory;

/// A running plugin instance as tracked by the plugin manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInstance {
    /// Metadata the instance was started from.
    pub metadata: MetadataWithDirectory,
    /// Built-in plugins cannot be reloaded or uninstalled.
    #[serde(default)]
    pub is_system: bool,
    /// Load timestamp (unix seconds).
    pub loaded_at: u64,
    /// How many times this identity has been swapped in since startup.
    #[serde(default)]
    pub generation: u32,
}

impl PluginInstance {
    /// Plugin identity.
    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.metadata.metadata.name
    }
}

/// Plugin descriptor file name.
pub const METADATA_FILE: &str = "plugin.json";

/// Build-output subdirectory of a dev plugin.
pub const DEFAULT_DIST_DIR: &str = "dist";
