//! Host services consumed by plugins and actions.
//!
//! Window, clipboard and notification integration live outside this crate.
//! [`ConsoleHost`] is the terminal stand-in used by the CLI and
//! [`RecordingHost`] captures every call for tests and embedding.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;

use parking_lot::Mutex;
use thiserror::Error;

use crate::plugin::MetadataCommand;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors raised by host integrations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("{command} failed: {reason}")]
    CommandFailed { command: &'static str, reason: String },
}

/// OS and UI integration the launcher host provides.
pub trait HostServices: Send + Sync {
    /// Show a user-visible notification.
    fn notify(&self, message: &str);

    /// Put text on the clipboard.
    fn write_clipboard(&self, text: &str) -> HostResult<()>;

    /// Name of the window that had focus before the launcher opened.
    fn active_window_name(&self) -> Option<String>;

    /// Paste text into the previously active window.
    fn paste_to_active_window(&self, text: &str) -> HostResult<()>;

    /// Replace the launcher's query box content.
    fn change_query(&self, query: &str);

    /// Ask the user to pick a directory.
    fn pick_directory(&self) -> Option<PathBuf>;

    /// Open a directory in the platform file manager.
    fn open_directory(&self, path: &Path) -> HostResult<()>;

    /// Replace the query commands a plugin exposes.
    fn register_query_commands(&self, plugin_id: &str, commands: Vec<MetadataCommand>);
}

/// Send a desktop notification.
#[cfg(feature = "notifications")]
fn send_desktop_notification(message: &str) {
    use notify_rust::Notification;

    let _ = Notification::new()
        .summary("palhost")
        .body(message)
        .icon("dialog-information")
        .appname("palhost")
        .timeout(5000)
        .show();
}

/// No-op notification when feature is disabled.
#[cfg(not(feature = "notifications"))]
fn send_desktop_notification(_message: &str) {}

/// Host implementation for the terminal.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    desktop_notifications: bool,
    picked: Mutex<Option<PathBuf>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also raise desktop notifications.
    pub fn with_desktop_notifications(mut self, enabled: bool) -> Self {
        self.desktop_notifications = enabled;
        self
    }

    /// Pre-answer the next directory picker with `path`.
    pub fn with_picked_directory(self, path: PathBuf) -> Self {
        *self.picked.lock() = Some(path);
        self
    }
}

impl HostServices for ConsoleHost {
    fn notify(&self, message: &str) {
        tracing::info!(message, "Notification");
        eprintln!("{message}");
        if self.desktop_notifications {
            send_desktop_notification(message);
        }
    }

    fn write_clipboard(&self, text: &str) -> HostResult<()> {
        // No clipboard in a terminal session; hand the text to stdout instead.
        println!("{text}");
        Ok(())
    }

    fn active_window_name(&self) -> Option<String> {
        None
    }

    fn paste_to_active_window(&self, _text: &str) -> HostResult<()> {
        Err(HostError::Unsupported("pasting to the active window"))
    }

    fn change_query(&self, query: &str) {
        println!("> {query}");
    }

    fn pick_directory(&self) -> Option<PathBuf> {
        self.picked.lock().take()
    }

    fn open_directory(&self, path: &Path) -> HostResult<()> {
        open_path_native(path)
    }

    fn register_query_commands(&self, plugin_id: &str, commands: Vec<MetadataCommand>) {
        tracing::info!(plugin = plugin_id, count = commands.len(), "Registered query commands");
    }
}

#[cfg(target_os = "macos")]
fn open_path_native(path: &Path) -> HostResult<()> {
    run_opener(Command::new("open").arg(path), "open")
}

#[cfg(target_os = "linux")]
fn open_path_native(path: &Path) -> HostResult<()> {
    run_opener(Command::new("xdg-open").arg(path), "xdg-open")
}

#[cfg(target_os = "windows")]
fn open_path_native(path: &Path) -> HostResult<()> {
    run_opener(Command::new("explorer").arg(path), "explorer")
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn open_path_native(_path: &Path) -> HostResult<()> {
    Err(HostError::Unsupported("opening directories"))
}

#[cfg(any(target_os = "macos", target_os = "linux", target_os = "windows"))]
fn run_opener(command: &mut Command, label: &'static str) -> HostResult<()> {
    let status = command
        .status()
        .map_err(|e| HostError::CommandFailed { command: label, reason: e.to_string() })?;
    if status.success() {
        Ok(())
    } else {
        Err(HostError::CommandFailed { command: label, reason: format!("exit status {status}") })
    }
}

/// Host that records every interaction.
#[derive(Debug, Default)]
pub struct RecordingHost {
    notifications: Mutex<Vec<String>>,
    clipboard: Mutex<Vec<String>>,
    pasted: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    opened: Mutex<Vec<PathBuf>>,
    registered: Mutex<Vec<(String, Vec<MetadataCommand>)>>,
    picks: Mutex<VecDeque<PathBuf>>,
    active_window: Mutex<Option<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the directory picker.
    pub fn queue_pick(&self, path: impl Into<PathBuf>) {
        self.picks.lock().push_back(path.into());
    }

    /// Pretend a window named `name` had focus.
    pub fn set_active_window(&self, name: impl Into<String>) {
        *self.active_window.lock() = Some(name.into());
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn clipboard(&self) -> Vec<String> {
        self.clipboard.lock().clone()
    }

    pub fn pasted(&self) -> Vec<String> {
        self.pasted.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().clone()
    }

    pub fn registered_commands(&self) -> Vec<(String, Vec<MetadataCommand>)> {
        self.registered.lock().clone()
    }
}

impl HostServices for RecordingHost {
    fn notify(&self, message: &str) {
        self.notifications.lock().push(message.to_string());
    }

    fn write_clipboard(&self, text: &str) -> HostResult<()> {
        self.clipboard.lock().push(text.to_string());
        Ok(())
    }

    fn active_window_name(&self) -> Option<String> {
        self.active_window.lock().clone()
    }

    fn paste_to_active_window(&self, text: &str) -> HostResult<()> {
        if self.active_window.lock().is_none() {
            return Err(HostError::Unsupported("pasting without an active window"));
        }
        self.pasted.lock().push(text.to_string());
        Ok(())
    }

    fn change_query(&self, query: &str) {
        self.queries.lock().push(query.to_string());
    }

    fn pick_directory(&self) -> Option<PathBuf> {
        self.picks.lock().pop_front()
    }

    fn open_directory(&self, path: &Path) -> HostResult<()> {
        self.opened.lock().push(path.to_path_buf());
        Ok(())
    }

    fn register_query_commands(&self, plugin_id: &str, commands: Vec<MetadataCommand>) {
        self.registered.lock().push((plugin_id.to_string(), commands));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_host_picks_in_order() {
        let host = RecordingHost::new();
        host.queue_pick("/a");
        host.queue_pick("/b");

        assert_eq!(host.pick_directory(), Some(PathBuf::from("/a")));
        assert_eq!(host.pick_directory(), Some(PathBuf::from("/b")));
        assert_eq!(host.pick_directory(), None);
    }

    #[test]
    fn test_paste_requires_active_window() {
        let host = RecordingHost::new();
        assert!(host.paste_to_active_window("x").is_err());

        host.set_active_window("Editor");
        host.paste_to_active_window("x").unwrap();
        assert_eq!(host.pasted(), vec!["x"]);
    }

    #[test]
    fn test_console_host_pick_is_consumed() {
        let host = ConsoleHost::new().with_picked_directory(PathBuf::from("/plugins/demo"));
        assert_eq!(host.pick_directory(), Some(PathBuf::from("/plugins/demo")));
        assert_eq!(host.pick_directory(), None);
    }
}
