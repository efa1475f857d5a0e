//! Per-result refresh scheduling.
//!
//! Each scheduled result gets one tokio task that sleeps for the current
//! `refresh_interval_ms`, runs the refresh step and publishes the new state
//! through a `watch` channel. The task re-arms with whatever interval the step
//! returned and exits once it is zero. Only that task ever writes the state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{QueryResult, Refresh, ResultState};

/// Read side of a scheduled result.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    id: String,
    state: watch::Receiver<ResultState>,
    live: Arc<AtomicBool>,
}

impl ResultHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest published state.
    pub fn current(&self) -> ResultState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every published state.
    pub fn subscribe(&self) -> watch::Receiver<ResultState> {
        self.state.clone()
    }

    /// Whether the latest state is terminal.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Whether the result is still displayed (not cancelled or superseded).
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Wait until the state is terminal or the result is dropped, and return
    /// the last published state.
    pub async fn finished(&self) -> ResultState {
        let mut rx = self.state.clone();
        loop {
            if rx.borrow_and_update().is_terminal() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        let state = rx.borrow().clone();
        state
    }
}

struct ScheduledResult {
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ScheduledResult {
    fn stop(self) {
        self.live.store(false, Ordering::Release);
        self.task.abort();
    }
}

/// Drives refresh loops for every displayed result.
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct RefreshScheduler {
    results: Mutex<HashMap<String, ScheduledResult>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler").field("results", &self.results.lock().len()).finish()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display `result` and start refreshing it per its behavior.
    pub fn display(&self, result: QueryResult) -> ResultHandle {
        let QueryResult { id, state, behavior } = result;
        self.schedule(id, state, behavior)
    }

    /// Start a refresh loop for `state` driven by `refresher`.
    ///
    /// Scheduling an id that is already live replaces the old loop.
    pub fn schedule<R: Refresh>(
        &self,
        id: impl Into<String>,
        state: ResultState,
        refresher: R,
    ) -> ResultHandle {
        let id = id.into();
        let (tx, rx) = watch::channel(state);
        let live = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(run_refresh_loop(id.clone(), refresher, tx, Arc::clone(&live)));

        let mut results = self.results.lock();
        results.retain(|_, scheduled| !scheduled.task.is_finished());
        if let Some(previous) =
            results.insert(id.clone(), ScheduledResult { live: Arc::clone(&live), task })
        {
            previous.stop();
        }

        ResultHandle { id, state: rx, live }
    }

    /// Stop refreshing `id`. Returns whether a loop was running.
    pub fn cancel(&self, id: &str) -> bool {
        match self.results.lock().remove(id) {
            Some(scheduled) => {
                let running = !scheduled.task.is_finished();
                scheduled.stop();
                tracing::debug!(result = id, "Cancelled result refresh");
                running
            }
            None => false,
        }
    }

    /// The user typed a new query: every displayed result is superseded.
    pub fn supersede(&self) {
        let drained: Vec<_> = self.results.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Superseding displayed results");
        }
        for (_, scheduled) in drained {
            scheduled.stop();
        }
    }

    /// Number of loops still running.
    pub fn active_count(&self) -> usize {
        self.results.lock().values().filter(|s| !s.task.is_finished()).count()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for (_, scheduled) in self.results.get_mut().drain() {
            scheduled.stop();
        }
    }
}

async fn run_refresh_loop<R: Refresh>(
    id: String,
    mut refresher: R,
    tx: watch::Sender<ResultState>,
    live: Arc<AtomicBool>,
) {
    loop {
        let interval = tx.borrow().refresh_interval_ms;
        if interval == 0 {
            break;
        }

        tokio::time::sleep(Duration::from_millis(interval)).await;
        if !live.load(Ordering::Acquire) {
            break;
        }

        let current = tx.borrow().clone();
        let next = refresher.refresh(current);

        // Superseded while refreshing: drop the result instead of publishing it.
        if !live.load(Ordering::Acquire) {
            break;
        }
        tx.send_replace(next);
    }

    tracing::trace!(result = %id, "Refresh loop finished");
}
