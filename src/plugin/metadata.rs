//! Plugin metadata parsing and validation.
//!
//! Every plugin directory carries a `plugin.json` descriptor. Dev plugins have
//! one in the source directory and another in the build output directory; the
//! latter describes the artifact that actually runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{PluginError, PluginResult, METADATA_FILE};

/// A query command a plugin exposes under its trigger keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataCommand {
    /// Command keyword (e.g. `dev.list`).
    pub command: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
}

/// Plugin descriptor as found in `plugin.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    /// Plugin identity, unique across the host.
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub author: String,
    /// Plugin version (semver).
    pub version: String,
    #[serde(default)]
    pub min_host_version: String,
    /// Runtime hosting the plugin (e.g. `nodejs`, `python`).
    #[serde(default)]
    pub runtime: String,
    /// Entry file relative to the plugin directory.
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub commands: Vec<MetadataCommand>,
    #[serde(default, rename = "SupportedOS")]
    pub supported_os: Vec<String>,
    #[serde(default)]
    pub features: Vec<serde_json::Value>,
}

impl Metadata {
    /// Parse metadata from a JSON string.
    pub fn from_json(directory: &Path, content: &str) -> PluginResult<Self> {
        let metadata: Self = serde_json::from_str(content).map_err(|e| {
            PluginError::InvalidMetadata {
                directory: directory.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        metadata.validate(directory)?;
        Ok(metadata)
    }

    /// Read and parse `plugin.json` from a plugin directory.
    pub fn from_directory(directory: &Path) -> PluginResult<Self> {
        let path = directory.join(METADATA_FILE);
        if !path.exists() {
            return Err(PluginError::NotFound(path));
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_json(directory, &content)
    }

    /// Validate the metadata.
    pub fn validate(&self, directory: &Path) -> PluginResult<()> {
        let invalid = |reason: &str| PluginError::InvalidMetadata {
            directory: directory.to_path_buf(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("plugin id is required"));
        }

        if self.name.trim().is_empty() {
            return Err(invalid("plugin name is required"));
        }

        // Basic semver check
        let version_parts: Vec<&str> = self.version.split('.').collect();
        if version_parts.len() < 2 || version_parts.iter().any(|p| p.parse::<u32>().is_err()) {
            return Err(invalid("version must be in semver format (e.g., 1.0.0)"));
        }

        Ok(())
    }

    /// Render the metadata as a markdown bullet list.
    pub fn to_markdown(&self, directory: &Path) -> String {
        let commands: Vec<&str> = self.commands.iter().map(|c| c.command.as_str()).collect();
        format!(
            "- **Directory**: {}\n- **Name**: {}\n- **Description**: {}\n- **Author**: {}\n\
             - **Website**: {}\n- **Version**: {}\n- **MinHostVersion**: {}\n- **Runtime**: {}\n\
             - **Entry**: {}\n- **TriggerKeywords**: {}\n- **Commands**: {}\n- **SupportedOS**: {}\n",
            directory.display(),
            self.name,
            self.description,
            self.author,
            self.website,
            self.version,
            self.min_host_version,
            self.runtime,
            self.entry,
            self.trigger_keywords.join(", "),
            commands.join(", "),
            self.supported_os.join(", "),
        )
    }
}

/// Metadata together with the directory it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataWithDirectory {
    pub metadata: Metadata,
    /// Directory containing `plugin.json`.
    pub directory: PathBuf,
    /// Loaded from a local working directory rather than an installed package.
    #[serde(default)]
    pub is_dev: bool,
    /// Source directory of a dev plugin whose artifact lives in `directory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_plugin_directory: Option<PathBuf>,
}

impl MetadataWithDirectory {
    pub fn new(metadata: Metadata, directory: PathBuf) -> Self {
        Self { metadata, directory, is_dev: false, dev_plugin_directory: None }
    }

    /// Plugin identity.
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}
