//! Core types shared across palhost.
//!
//! Currently this is the configuration layer; everything else lives in the
//! feature modules (`result`, `stream`, `dev`).

mod config;

pub use config::{AiConfig, Config, DevConfig, GeneralConfig, RefreshConfig};
