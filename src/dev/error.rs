//! Dev plugin error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::PluginError;
use crate::settings::SettingsError;

/// Result type for dev plugin operations.
pub type DevResult<T> = Result<T, DevError>;

/// Errors raised while managing dev plugins.
#[derive(Debug, Error)]
pub enum DevError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Dev plugin {0} is not loaded")]
    UnknownPlugin(String),

    #[error("Dev plugin directory {} is not registered", .0.display())]
    NotRegistered(PathBuf),

    #[error("Build output {} is missing: {reason}", path.display())]
    MissingDist { path: PathBuf, reason: String },

    #[error("Failed to watch {}: {reason}", path.display())]
    Watch { path: PathBuf, reason: String },

    #[error("Invalid dev plugin directory list: {0}")]
    DirectoryList(#[from] serde_json::Error),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
