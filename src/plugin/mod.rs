//! Plugin manager collaborator.
//!
//! The refresh and hot-reload machinery talks to the plugin manager through
//! the [`PluginManager`] trait only. [`LocalPluginManager`] keeps instances in
//! memory and is what the CLI and the tests run against.
//!
//! # Descriptor
//!
//! ```json
//! {
//!   "Id": "8a4b1b7e-6f1a-4e39-9f55-1c2f0a3c7d10",
//!   "Name": "Calendar",
//!   "Version": "0.2.1",
//!   "Runtime": "nodejs",
//!   "Entry": "index.js",
//!   "TriggerKeywords": ["cal"]
//! }
//! ```

mod error;
mod manager;
mod metadata;
mod types;

pub use error::{PluginError, PluginResult};
pub use manager::{LocalPluginManager, PluginManager};
pub use metadata::{Metadata, MetadataCommand, MetadataWithDirectory};
pub use types::{PluginInstance, DEFAULT_DIST_DIR, METADATA_FILE};
