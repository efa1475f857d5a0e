//! Plugin system error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur during plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin directory or descriptor not found.
    #[error("Plugin not found: {0}")]
    NotFound(PathBuf),

    /// Invalid plugin metadata.
    #[error("Invalid plugin metadata in {directory}: {reason}")]
    InvalidMetadata { directory: PathBuf, reason: String },

    /// Plugin loading failed.
    #[error("Failed to load plugin '{id}': {reason}")]
    LoadError { id: String, reason: String },

    /// The manager refused to swap the running instance.
    #[error("Plugin manager rejected reload of '{id}': {reason}")]
    Rejected { id: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
