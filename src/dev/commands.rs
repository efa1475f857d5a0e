//! In-launcher commands for the dev plugin workflow.

use std::path::{Path, PathBuf};

use super::{AddOutcome, DevPluginManager, DevResult, RemoveOutcome};
use crate::plugin::{MetadataCommand, MetadataWithDirectory};
use crate::result::{
    ActionKind, PluginQuery, Preview, QueryResult, ResultAction, ResultBehavior, ResultState,
};

/// Trigger keyword of the dev commands.
pub const DEV_TRIGGER_KEYWORD: &str = "plugin";

pub const DEV_ADD: &str = "dev.add";
pub const DEV_REMOVE: &str = "dev.remove";
pub const DEV_RELOAD: &str = "dev.reload";
pub const DEV_LIST: &str = "dev.list";

const DEV_ICON: &str = "plugin";
const PROGRESS_POLL_MS: u64 = 300;

/// Actions attached to dev command results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevAction {
    /// Reload one loaded plugin by identity.
    Reload(String),
    OpenDirectory(PathBuf),
    /// Unregister a directory, keeping its files.
    Remove(PathBuf),
    RemoveAndDelete(PathBuf),
    /// Re-read the directory list and reload everything in the background.
    ReloadAll,
}

/// Commands to register under [`DEV_TRIGGER_KEYWORD`].
pub fn query_commands() -> Vec<MetadataCommand> {
    [
        (DEV_ADD, "Add a local plugin directory"),
        (DEV_REMOVE, "Remove a local plugin directory"),
        (DEV_RELOAD, "Reload all dev plugins"),
        (DEV_LIST, "List dev plugins"),
    ]
    .into_iter()
    .map(|(command, description)| MetadataCommand {
        command: command.to_string(),
        description: description.to_string(),
    })
    .collect()
}

impl DevPluginManager {
    /// Answer a dev command query.
    pub fn query(&self, query: &PluginQuery) -> Vec<QueryResult> {
        match query.command.as_str() {
            DEV_ADD => self.add_command(),
            DEV_REMOVE => self.remove_command(query.search.trim()),
            DEV_RELOAD => vec![self.reload_command()],
            DEV_LIST => self.list_command(query.search.trim()),
            other => {
                tracing::debug!(command = other, "Unknown dev command");
                Vec::new()
            }
        }
    }

    /// Run a dev action.
    pub async fn execute(&self, action: &DevAction) -> DevResult<()> {
        match action {
            DevAction::Reload(id) => self.reload_by_id(id, "reload by user").await,
            DevAction::OpenDirectory(directory) => {
                if let Err(e) = self.inner.host.open_directory(directory) {
                    tracing::error!(
                        directory = %directory.display(),
                        error = %e,
                        "Failed to open directory"
                    );
                    self.inner.host.notify(&format!("Failed to open directory: {e}"));
                }
                Ok(())
            }
            DevAction::Remove(directory) => self.remove_directory(directory, false).map(drop),
            DevAction::RemoveAndDelete(directory) => {
                self.remove_directory(directory, true).map(drop)
            }
            DevAction::ReloadAll => {
                let manager = self.clone();
                self.inner.runtime.spawn(async move {
                    if let Err(e) = manager.full_reload("reload after user action").await {
                        tracing::error!(error = %e, "Failed to reload dev plugins");
                    }
                });
                Ok(())
            }
        }
    }

    fn add_command(&self) -> Vec<QueryResult> {
        let host = &self.inner.host;
        let Some(directory) = host.pick_directory() else {
            host.notify("Please choose a directory");
            return Vec::new();
        };

        match self.add_directory(&directory) {
            Ok(AddOutcome::AlreadyAdded) => host.notify("Directory already added"),
            Ok(AddOutcome::Added(_)) => {}
            Err(e) => {
                tracing::error!(
                    directory = %directory.display(),
                    error = %e,
                    "Failed to add dev plugin directory"
                );
                host.notify(&format!("Failed to add directory: {e}"));
            }
        }
        Vec::new()
    }

    fn remove_command(&self, search: &str) -> Vec<QueryResult> {
        let host = &self.inner.host;
        if search.is_empty() {
            host.notify("Please input the plugin directory");
            return Vec::new();
        }

        let directory = PathBuf::from(shellexpand::tilde(search).as_ref());
        match self.remove_directory(&directory, false) {
            Ok(RemoveOutcome::NotFound) => host.notify("Directory not found"),
            Ok(RemoveOutcome::Removed) => {}
            Err(e) => host.notify(&format!("Failed to remove directory: {e}")),
        }
        Vec::new()
    }

    fn reload_command(&self) -> QueryResult {
        let progress = self.progress();
        if progress.is_running() {
            let status = progress.snapshot();
            let state = ResultState::new(status.title)
                .with_subtitle(status.subtitle)
                .with_icon(DEV_ICON)
                .with_refresh_interval(PROGRESS_POLL_MS);
            return QueryResult::new(state, ResultBehavior::ProgressPoll(progress));
        }

        QueryResult::fixed(
            ResultState::new("Reload all dev plugins")
                .with_icon(DEV_ICON)
                .with_action(
                    ResultAction::new("Reload", ActionKind::Dev(DevAction::ReloadAll))
                        .default_action(),
                ),
        )
    }

    fn list_command(&self, search: &str) -> Vec<QueryResult> {
        let search = search.to_lowercase();
        let mut loaded = self.loaded();
        loaded.retain(|p| search.is_empty() || p.metadata.name.to_lowercase().contains(&search));

        if loaded.is_empty() {
            let empty = ResultState::new("No dev plugins loaded").with_icon(DEV_ICON);
            return vec![QueryResult::fixed(empty)];
        }
        loaded.iter().map(|plugin| list_result(plugin, self.is_watching(plugin.id()))).collect()
    }
}

fn list_result(plugin: &MetadataWithDirectory, watching: bool) -> QueryResult {
    let directory: &Path = &plugin.directory;
    let preview = Preview::markdown(plugin.metadata.to_markdown(directory))
        .with_property("Watching", if watching { "yes" } else { "no" });
    let icon =
        if plugin.metadata.icon.is_empty() { DEV_ICON } else { plugin.metadata.icon.as_str() };
    let dev = ActionKind::Dev;

    let state = ResultState::new(plugin.metadata.name.clone())
        .with_subtitle(plugin.metadata.description.clone())
        .with_icon(icon)
        .with_preview(preview)
        .with_action(
            ResultAction::new("Reload", dev(DevAction::Reload(plugin.id().to_string())))
                .default_action(),
        )
        .with_action(ResultAction::new(
            "Open directory",
            dev(DevAction::OpenDirectory(directory.to_path_buf())),
        ))
        .with_action(ResultAction::new("Remove", dev(DevAction::Remove(directory.to_path_buf()))))
        .with_action(ResultAction::new(
            "Remove and delete",
            dev(DevAction::RemoveAndDelete(directory.to_path_buf())),
        ));
    QueryResult::fixed(state)
}
