//! Keyed debounce timers.
//!
//! Each key has at most one pending timer. Triggering a key that already has
//! one aborts it and arms a fresh timer, so a burst of triggers runs the job
//! once, a full delay after the last trigger.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct PendingTimer {
    generation: u64,
    task: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, PendingTimer>>>;

/// Set-or-reset timers keyed by `K`.
///
/// Safe to trigger from threads outside the runtime (e.g. a file watcher's
/// event thread); timers are spawned on the runtime handle given at
/// construction.
pub struct Debouncer<K> {
    delay: Duration,
    runtime: Handle,
    pending: PendingMap<K>,
    generation: AtomicU64,
}

impl<K> std::fmt::Debug for Debouncer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer for `key`. When it fires, `job` is spawned
    /// detached, so cancelling later never interrupts a job already running.
    pub fn trigger<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let runtime = self.runtime.clone();
        let delay = self.delay;
        let timer_key = key.clone();

        let mut timers = self.pending.lock();
        if let Some(previous) = timers.remove(&key) {
            previous.task.abort();
        }

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = pending.lock();
                match timers.get(&timer_key) {
                    Some(timer) if timer.generation == generation => {
                        timers.remove(&timer_key);
                    }
                    // Replaced after we woke up.
                    _ => return,
                }
            }
            runtime.spawn(job());
        });

        timers.insert(key, PendingTimer { generation, task });
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, timer) in self.pending.lock().drain() {
            timer.task.abort();
        }
    }
}
