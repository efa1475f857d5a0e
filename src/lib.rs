//! # Palhost
//!
//! Plugin host runtime for a query launcher: live-refreshing results and
//! hot-reloaded dev plugins.
//!
//! Plugins answer queries with results that keep changing after they are
//! displayed. A result carries a refresh interval and a refresh step; the
//! host polls it until the interval drops to zero or a newer query replaces
//! it. Streaming answers from a language model are the main user of this.
//!
//! Plugins under development are loaded straight from their working
//! directory. Their build output is watched and every rebuild is hot-swapped
//! into the running host, one reload per burst of file changes.
//!
//! ## Features
//!
//! - **Refreshable results**: bounded polling, cancelled on supersede
//! - **Streaming answers**: token deltas applied in order, lazy or eager start
//! - **AI commands**: configurable prompts over text or image selections
//! - **Dev plugins**: debounced hot reload with per-plugin serialization
//!
//! ## Quick Start
//!
//! ```bash
//! # Register a plugin under development
//! palhost dev add ~/src/my-plugin
//!
//! # Hot-reload it on every rebuild
//! palhost watch
//!
//! # Run an AI command
//! palhost ask translate "bonjour tout le monde"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::uninlined_format_args)]

pub mod ai_command;
pub mod core;
pub mod dev;
pub mod host;
pub mod plugin;
pub mod result;
pub mod settings;
pub mod stream;

// Re-export commonly used types
pub use ai_command::{AiCommandPlugin, CommandSetting};
pub use core::Config;
pub use dev::{DevAction, DevError, DevPluginManager};
pub use host::{ConsoleHost, HostServices};
pub use plugin::{LocalPluginManager, PluginManager};
pub use result::{
    ActionExecutor, PluginQuery, QueryResult, RefreshScheduler, ResultHandle, ResultState,
};
pub use settings::{JsonSettingsStore, SettingsStore};
pub use stream::{ChatBackend, StreamingAdapter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "palhost";
