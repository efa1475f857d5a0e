//! Refreshable query results.
//!
//! A [`QueryResult`] is displayed state plus a [`ResultBehavior`]. The
//! [`RefreshScheduler`] keeps calling the behavior's refresh step until the
//! state's refresh interval drops to zero or the result is superseded by a
//! new query. Readers observe the state through a [`ResultHandle`].

mod action;
mod behavior;
mod query;
mod scheduler;
mod state;

pub use action::{ActionError, ActionExecutor, ActionKind, ActionOutcome, StartSignal};
pub use behavior::{ProgressStatus, ProgressTracker, Refresh, ResultBehavior};
pub use query::{PluginQuery, QueryKind, Selection};
pub use scheduler::{RefreshScheduler, ResultHandle};
pub use state::{Preview, PreviewKind, ResultAction, ResultState, ScrollAnchor};

/// A result produced by a plugin query.
#[derive(Debug)]
pub struct QueryResult {
    pub id: String,
    pub state: ResultState,
    pub behavior: ResultBehavior,
}

impl QueryResult {
    /// A result that is never refreshed.
    pub fn fixed(state: ResultState) -> Self {
        Self::new(state, ResultBehavior::Static)
    }

    pub fn new(state: ResultState, behavior: ResultBehavior) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), state, behavior }
    }

    /// Whether the result will be refreshed after display.
    pub fn is_refreshing(&self) -> bool {
        !matches!(self.behavior, ResultBehavior::Static) && !self.state.is_terminal()
    }
}
