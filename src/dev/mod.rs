//! Dev plugin hot reload.
//!
//! Plugins under development live in local working directories registered
//! with [`DevPluginManager`]. Each one gets a filesystem watch on its build
//! output; bursts of change events are collapsed by a [`Debouncer`] into a
//! single reload, which re-reads the built metadata and asks the plugin
//! manager to hot-swap the running instance.
//!
//! On startup every persisted directory is loaded and, after a grace period,
//! force-reloaded once so instances pick up builds made while the host was
//! down.

mod commands;
mod debounce;
mod error;
mod manager;
mod registry;
mod reload;
mod watcher;

pub use commands::{
    query_commands, DevAction, DEV_ADD, DEV_LIST, DEV_RELOAD, DEV_REMOVE, DEV_TRIGGER_KEYWORD,
};
pub use debounce::Debouncer;
pub use error::{DevError, DevResult};
pub use manager::{AddOutcome, DevPluginManager, LoadSummary, RemoveOutcome};
pub use registry::{
    encode_directory_list, parse_directory_list, DevPluginEntry, LocalPluginRecord,
    LOCAL_PLUGIN_DIRECTORIES_KEY,
};
pub use reload::ReloadReport;
pub use watcher::{is_reload_relevant, DistWatcher};
