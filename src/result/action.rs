//! Result actions and their execution.
//!
//! Actions run against a snapshot of the result state. They read
//! `context_data` rather than the live preview, so running one concurrently
//! with the next refresh tick is safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::ResultState;
use crate::dev::{DevAction, DevError, DevPluginManager};
use crate::host::{HostError, HostServices};

/// Shared flag flipped by a "start" action and polled by a lazy stream.
#[derive(Debug, Clone, Default)]
pub struct StartSignal(Arc<AtomicBool>);

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_start(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What an action does when run.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Let a lazily started stream begin generating.
    StartGeneration(StartSignal),
    /// Copy fixed text.
    CopyText(String),
    /// Copy the result's `context_data`.
    CopyContext,
    /// Paste fixed text into the previously active window.
    PasteToActiveWindow(String),
    /// Paste the result's `context_data` into the previously active window.
    PasteContext,
    /// Replace the launcher query.
    ChangeQuery(String),
    /// Dev plugin management.
    Dev(DevAction),
}

/// Errors raised while running an action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Result has no actions")]
    NoActions,

    #[error("Dev plugin actions are not available")]
    DevUnavailable,

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Dev(#[from] DevError),
}

/// What the launcher should do after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    pub hide_launcher: bool,
}

/// Runs result actions against the host.
#[derive(Clone)]
pub struct ActionExecutor {
    host: Arc<dyn HostServices>,
    dev: Option<DevPluginManager>,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor").field("dev", &self.dev.is_some()).finish()
    }
}

impl ActionExecutor {
    pub fn new(host: Arc<dyn HostServices>) -> Self {
        Self { host, dev: None }
    }

    /// Enable dev plugin actions.
    pub fn with_dev(mut self, dev: DevPluginManager) -> Self {
        self.dev = Some(dev);
        self
    }

    /// Run the action with id `action_id` of `state`.
    pub async fn execute(
        &self,
        state: &ResultState,
        action_id: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let action =
            state.action(action_id).ok_or_else(|| ActionError::NotFound(action_id.to_string()))?;
        self.run(state, &action.kind).await?;
        Ok(ActionOutcome { hide_launcher: !action.prevent_auto_hide })
    }

    /// Run the default action of `state`.
    pub async fn execute_default(&self, state: &ResultState) -> Result<ActionOutcome, ActionError> {
        let id = state.default_action().ok_or(ActionError::NoActions)?.id.clone();
        self.execute(state, &id).await
    }

    async fn run(&self, state: &ResultState, kind: &ActionKind) -> Result<(), ActionError> {
        match kind {
            ActionKind::StartGeneration(signal) => {
                signal.request_start();
            }
            ActionKind::CopyText(text) => self.host.write_clipboard(text)?,
            ActionKind::CopyContext => {
                if let Some(text) = self.context(state) {
                    self.host.write_clipboard(text)?;
                }
            }
            ActionKind::PasteToActiveWindow(text) => self.host.paste_to_active_window(text)?,
            ActionKind::PasteContext => {
                if let Some(text) = self.context(state) {
                    self.host.paste_to_active_window(text)?;
                }
            }
            ActionKind::ChangeQuery(query) => self.host.change_query(query),
            ActionKind::Dev(action) => {
                let dev = self.dev.as_ref().ok_or(ActionError::DevUnavailable)?;
                dev.execute(action).await?;
            }
        }
        Ok(())
    }

    fn context<'a>(&self, state: &'a ResultState) -> Option<&'a str> {
        if state.context_data.is_empty() {
            self.host.notify("The answer is not ready yet");
            None
        } else {
            Some(&state.context_data)
        }
    }
}
