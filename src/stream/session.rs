//! Background consumption of a chat stream.
//!
//! The backend stream is driven on its own tokio task so the refresh step
//! never blocks on the network. Events arrive on an unbounded channel and are
//! drained without waiting on every tick.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use super::{ChatBackend, ChatError, ChatModel, ConversationTurn};

/// How long to wait for the next delta before failing the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallPolicy {
    pub timeout: Option<Duration>,
}

impl StallPolicy {
    /// Wait indefinitely.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

/// Something that happened on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Delta(String),
    Finished,
    Failed(String),
}

/// A running chat stream.
///
/// Dropping the session aborts the background task.
#[derive(Debug)]
pub struct StreamSession {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
    terminated: bool,
}

impl StreamSession {
    /// Start streaming `turns` to `backend`. Must be called within a runtime.
    pub fn open(
        backend: Arc<dyn ChatBackend>,
        model: ChatModel,
        turns: Vec<ConversationTurn>,
        policy: StallPolicy,
    ) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let terminal = pump(backend.as_ref(), &model, &turns, policy, &tx).await;
            let _ = tx.send(terminal);
        });
        Self { events, task, terminated: false }
    }

    /// Everything received since the last drain. Never waits.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        if self.terminated {
            return drained;
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    let terminal = !matches!(event, SessionEvent::Delta(_));
                    drained.push(event);
                    if terminal {
                        self.terminated = true;
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    drained.push(SessionEvent::Failed("stream closed unexpectedly".to_string()));
                    self.terminated = true;
                    break;
                }
            }
        }
        drained
    }

    /// Whether a terminal event has been drained.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Forward deltas until the stream ends. Returns the terminal event.
async fn pump(
    backend: &dyn ChatBackend,
    model: &ChatModel,
    turns: &[ConversationTurn],
    policy: StallPolicy,
    tx: &mpsc::UnboundedSender<SessionEvent>,
) -> SessionEvent {
    let mut stream = match backend.stream_chat(model, turns).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(backend = backend.name(), error = %e, "Failed to start chat stream");
            return SessionEvent::Failed(e.to_string());
        }
    };

    loop {
        let next = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(ChatError::Stalled(limit))),
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(delta)) => {
                if !delta.text.is_empty() && tx.send(SessionEvent::Delta(delta.text)).is_err() {
                    // Receiver gone, nobody is displaying this answer anymore.
                    return SessionEvent::Finished;
                }
                if delta.finished {
                    return SessionEvent::Finished;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(backend = backend.name(), error = %e, "Chat stream failed");
                return SessionEvent::Failed(e.to_string());
            }
            // Ending without a finished flag counts as finished.
            None => return SessionEvent::Finished,
        }
    }
}
