//! Refresh behaviors attached to results.

use std::sync::Arc;

use parking_lot::RwLock;

use super::ResultState;
use crate::stream::StreamingAdapter;

/// A refresh step: receives the current state and returns the next one.
///
/// Implementations own whatever state they need between ticks. Returning a
/// state with `refresh_interval_ms == 0` ends the refresh loop.
pub trait Refresh: Send + 'static {
    fn refresh(&mut self, current: ResultState) -> ResultState;
}

impl<F> Refresh for F
where
    F: FnMut(ResultState) -> ResultState + Send + 'static,
{
    fn refresh(&mut self, current: ResultState) -> ResultState {
        self(current)
    }
}

/// The refresh variants a result can carry.
pub enum ResultBehavior {
    /// Never refreshed.
    Static,
    /// Incrementally filled by a streaming answer.
    StreamingAnswer(Box<StreamingAdapter>),
    /// Mirrors a background operation's progress.
    ProgressPoll(ProgressTracker),
}

impl std::fmt::Debug for ResultBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => f.write_str("Static"),
            Self::StreamingAnswer(adapter) => {
                f.debug_tuple("StreamingAnswer").field(&adapter.phase()).finish()
            }
            Self::ProgressPoll(tracker) => f.debug_tuple("ProgressPoll").field(tracker).finish(),
        }
    }
}

impl Refresh for ResultBehavior {
    fn refresh(&mut self, mut current: ResultState) -> ResultState {
        match self {
            Self::Static => {
                current.refresh_interval_ms = 0;
                current
            }
            Self::StreamingAnswer(adapter) => adapter.refresh(current),
            Self::ProgressPoll(tracker) => tracker.refresh(current),
        }
    }
}

/// Snapshot of a background operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStatus {
    pub title: String,
    pub subtitle: String,
    pub running: bool,
}

/// Shared progress of a background operation, read by a polling result.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    status: Arc<RwLock<ProgressStatus>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operation as started.
    pub fn begin(&self, title: impl Into<String>) {
        let mut status = self.status.write();
        status.title = title.into();
        status.subtitle.clear();
        status.running = true;
    }

    /// Update the progress line.
    pub fn update(&self, subtitle: impl Into<String>) {
        self.status.write().subtitle = subtitle.into();
    }

    /// Mark the operation as done.
    pub fn finish(&self, title: impl Into<String>) {
        let mut status = self.status.write();
        status.title = title.into();
        status.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.status.read().running
    }

    pub fn snapshot(&self) -> ProgressStatus {
        self.status.read().clone()
    }
}

impl Refresh for ProgressTracker {
    fn refresh(&mut self, mut current: ResultState) -> ResultState {
        let status = self.snapshot();
        if !status.title.is_empty() {
            current.title = status.title;
        }
        current.subtitle = status.subtitle;
        if !status.running {
            current.refresh_interval_ms = 0;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_polls_until_finished() {
        let mut tracker = ProgressTracker::new();
        tracker.begin("Reloading dev plugins");
        tracker.update("1/3");

        let state = tracker.refresh(ResultState::new("Reload").with_refresh_interval(100));
        assert_eq!(state.title, "Reloading dev plugins");
        assert_eq!(state.subtitle, "1/3");
        assert_eq!(state.refresh_interval_ms, 100);

        tracker.finish("Reloaded 3 dev plugins");
        let state = tracker.refresh(state);
        assert_eq!(state.title, "Reloaded 3 dev plugins");
        assert!(state.is_terminal());
    }

    #[test]
    fn test_static_behavior_terminates() {
        let mut behavior = ResultBehavior::Static;
        let state = behavior.refresh(ResultState::new("x").with_refresh_interval(50));
        assert!(state.is_terminal());
    }

    #[test]
    fn test_closure_refresh() {
        let mut ticks = 0;
        let mut step = move |mut s: ResultState| {
            ticks += 1;
            s.subtitle = ticks.to_string();
            s
        };
        let state = step.refresh(ResultState::new("x"));
        let state = step.refresh(state);
        assert_eq!(state.subtitle, "2");
    }
}
