//! Streaming answer state machine.
//!
//! ```text
//! Idle --start requested--> Preparing --first delta--> Answering --finished--> Done
//! Idle | Preparing | Answering --stream error--> Errored
//! ```
//!
//! The adapter is driven once per refresh tick. A tick never waits: it only
//! drains deltas the background [`StreamSession`] has already delivered.

use std::sync::Arc;

use tokio::time::Instant;

use super::{
    ChatBackend, ChatModel, ConversationTurn, SessionEvent, StallPolicy, StreamSession,
};
use crate::result::{ActionKind, Refresh, ResultAction, ResultState, ScrollAnchor, StartSignal};

/// Subtitle shown while waiting for and receiving deltas.
pub const ANSWERING_TEXT: &str = "Answering...";

/// Preview shown while a lazily started answer waits for the user.
pub const ENTER_TO_START_TEXT: &str = "Press Enter to start";

/// Phase of a streaming answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPhase {
    Idle,
    Preparing,
    Answering,
    Done,
    Errored,
}

impl AnswerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

/// How a consumer wants its answer presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerProfile {
    /// Wait for a start request before contacting the backend.
    pub lazy_start: bool,
    /// Preview and subtitle set when entering `Preparing`.
    pub preparing_text: Option<String>,
    /// Rewrite the subtitle with the elapsed time once done.
    pub report_elapsed: bool,
    /// Replace the actions with copy/paste of the answer once done.
    pub finish_actions: bool,
    /// Window name for the paste action, if pasting is possible.
    pub paste_target: Option<String>,
}

impl AnswerProfile {
    /// Start on request, show progress and offer copy/paste when done.
    pub fn on_demand(paste_target: Option<String>) -> Self {
        Self {
            lazy_start: true,
            preparing_text: Some(ANSWERING_TEXT.to_string()),
            report_elapsed: true,
            finish_actions: true,
            paste_target,
        }
    }

    /// Start right away and append deltas to whatever is displayed.
    pub fn chat() -> Self {
        Self::default()
    }
}

/// Drives one result from a chat stream.
pub struct StreamingAdapter {
    backend: Arc<dyn ChatBackend>,
    model: ChatModel,
    turns: Vec<ConversationTurn>,
    policy: StallPolicy,
    profile: AnswerProfile,
    start: StartSignal,

    phase: AnswerPhase,
    session: Option<StreamSession>,
    first_delta_seen: bool,
    started_at: Option<Instant>,
    answer: String,
}

impl StreamingAdapter {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: ChatModel,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            backend,
            model,
            turns,
            policy: StallPolicy::none(),
            profile: AnswerProfile::chat(),
            start: StartSignal::new(),
            phase: AnswerPhase::Idle,
            session: None,
            first_delta_seen: false,
            started_at: None,
            answer: String::new(),
        }
    }

    pub fn with_profile(mut self, profile: AnswerProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_stall_policy(mut self, policy: StallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn phase(&self) -> AnswerPhase {
        self.phase
    }

    /// Signal a "run" action flips to start a lazy answer.
    pub fn start_signal(&self) -> StartSignal {
        self.start.clone()
    }

    /// Answer text received so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Advance the state machine by one tick.
    pub fn step(&mut self, mut current: ResultState) -> ResultState {
        if self.phase == AnswerPhase::Idle {
            if self.profile.lazy_start && !self.start.is_requested() {
                return current;
            }
            self.prepare(&mut current);
        }

        if self.phase.is_terminal() {
            current.refresh_interval_ms = 0;
            return current;
        }

        let events = match self.session.as_mut() {
            Some(session) => session.drain(),
            None => Vec::new(),
        };
        for event in events {
            match event {
                SessionEvent::Delta(text) => self.apply_delta(&mut current, &text),
                SessionEvent::Finished => {
                    self.finish(&mut current);
                    break;
                }
                SessionEvent::Failed(message) => {
                    self.fail(&mut current, &message);
                    break;
                }
            }
        }
        current
    }

    fn prepare(&mut self, current: &mut ResultState) {
        self.started_at = Some(Instant::now());
        if let Some(text) = &self.profile.preparing_text {
            current.preview.content.clone_from(text);
            current.subtitle.clone_from(text);
        }

        tracing::debug!(
            backend = self.backend.name(),
            model = %self.model,
            turns = self.turns.len(),
            "Starting answer stream"
        );
        self.session = Some(StreamSession::open(
            Arc::clone(&self.backend),
            self.model.clone(),
            self.turns.clone(),
            self.policy,
        ));
        self.phase = AnswerPhase::Preparing;
    }

    fn apply_delta(&mut self, current: &mut ResultState, text: &str) {
        if !self.first_delta_seen {
            self.first_delta_seen = true;
            if self.profile.preparing_text.is_some() {
                current.preview.content.clear();
            }
            self.phase = AnswerPhase::Answering;
        }
        current.preview.content.push_str(text);
        current.preview.scroll_anchor = ScrollAnchor::Bottom;
        self.answer.push_str(text);
    }

    fn finish(&mut self, current: &mut ResultState) {
        if !self.first_delta_seen && self.profile.preparing_text.is_some() {
            current.preview.content.clear();
        }
        current.refresh_interval_ms = 0;
        current.context_data.clone_from(&self.answer);

        let elapsed_ms = self.started_at.map_or(0, |t| t.elapsed().as_millis() as u64);
        if self.profile.report_elapsed {
            current.subtitle = format!("Answered in {elapsed_ms}ms");
        }

        if self.profile.finish_actions {
            current.actions = vec![ResultAction::new(
                "Copy",
                ActionKind::CopyText(self.answer.clone()),
            )
            .default_action()
            .with_icon("copy")];
            if let Some(window) = &self.profile.paste_target {
                current.actions.push(ResultAction::new(
                    format!("Paste to {window}"),
                    ActionKind::PasteToActiveWindow(self.answer.clone()),
                ));
            }
        }

        tracing::debug!(chars = self.answer.len(), elapsed_ms, "Answer finished");
        self.phase = AnswerPhase::Done;
        self.session = None;
    }

    fn fail(&mut self, current: &mut ResultState, message: &str) {
        current.preview.content.push_str(&format!("\n\nError: {message}"));
        current.refresh_interval_ms = 0;
        tracing::warn!(error = message, "Answer failed");
        self.phase = AnswerPhase::Errored;
        self.session = None;
    }
}

impl Refresh for StreamingAdapter {
    fn refresh(&mut self, current: ResultState) -> ResultState {
        self.step(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Preview;
    use crate::stream::{ScriptStep, ScriptedBackend};
    use std::time::Duration;

    fn waiting_state() -> ResultState {
        ResultState::new("Summarize")
            .with_preview(Preview::text(ENTER_TO_START_TEXT))
            .with_refresh_interval(100)
    }

    async fn run_to_end(adapter: &mut StreamingAdapter, mut state: ResultState) -> ResultState {
        for _ in 0..1000 {
            state = adapter.step(state);
            if state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_adapter_waits_for_start() {
        let backend = Arc::new(ScriptedBackend::from_deltas(["hi"]));
        let mut adapter = StreamingAdapter::new(backend.clone(), ChatModel::default(), vec![])
            .with_profile(AnswerProfile::on_demand(None));

        let mut state = waiting_state();
        for _ in 0..5 {
            state = adapter.step(state);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(adapter.phase(), AnswerPhase::Idle);
        assert_eq!(state.preview.content, ENTER_TO_START_TEXT);
        assert_eq!(state.refresh_interval_ms, 100);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_concatenates_deltas_in_order() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptStep::Pause(Duration::from_millis(150)),
            ScriptStep::Delta("The ".into()),
            ScriptStep::Delta("quick ".into()),
            ScriptStep::Pause(Duration::from_millis(250)),
            ScriptStep::Delta("fox".into()),
        ]));
        let mut adapter = StreamingAdapter::new(backend, ChatModel::default(), vec![])
            .with_profile(AnswerProfile::on_demand(Some("Editor".into())));
        adapter.start_signal().request_start();

        let state = adapter.step(waiting_state());
        assert_eq!(adapter.phase(), AnswerPhase::Preparing);
        assert_eq!(state.preview.content, ANSWERING_TEXT);

        let state = run_to_end(&mut adapter, state).await;
        assert_eq!(adapter.phase(), AnswerPhase::Done);
        assert_eq!(state.preview.content, "The quick fox");
        assert_eq!(state.context_data, "The quick fox");
        assert_eq!(state.preview.scroll_anchor, ScrollAnchor::Bottom);
        assert!(state.subtitle.starts_with("Answered in "));
        assert_eq!(state.actions.len(), 2);
        assert!(matches!(&state.actions[0].kind, ActionKind::CopyText(t) if t == "The quick fox"));
        assert!(state.actions[1].name.contains("Editor"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_appends_block_and_stops() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptStep::Delta("partial".into()),
            ScriptStep::Fail("model not loaded".into()),
        ]));
        let mut adapter = StreamingAdapter::new(backend, ChatModel::default(), vec![]);

        let initial = ResultState::new("chat").with_refresh_interval(100);
        let state = run_to_end(&mut adapter, initial).await;
        assert_eq!(adapter.phase(), AnswerPhase::Errored);
        assert!(state.is_terminal());
        assert_eq!(state.preview.content, "partial\n\nError: Stream error: model not loaded");
        assert!(state.context_data.is_empty());

        // Terminal phases stay put.
        let again = adapter.step(state.clone());
        assert_eq!(again.preview.content, state.preview.content);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_profile_keeps_actions() {
        let backend = Arc::new(ScriptedBackend::from_deltas(["a", "b"]));
        let mut adapter = StreamingAdapter::new(backend, ChatModel::default(), vec![]);
        let initial = ResultState::new("chat")
            .with_refresh_interval(100)
            .with_action(ResultAction::new("Copy", ActionKind::CopyContext));

        let state = run_to_end(&mut adapter, initial).await;
        assert_eq!(state.context_data, "ab");
        assert_eq!(state.actions.len(), 1);
        assert!(matches!(state.actions[0].kind, ActionKind::CopyContext));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_backend_errors_under_policy() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ScriptStep::Delta("thinking".into()),
            ScriptStep::Hang,
            ScriptStep::Delta("never".into()),
        ]));
        let mut adapter = StreamingAdapter::new(backend, ChatModel::default(), vec![])
            .with_stall_policy(StallPolicy::after(Duration::from_secs(10)));

        let initial = ResultState::new("chat").with_refresh_interval(100);
        let state = run_to_end(&mut adapter, initial).await;
        assert_eq!(adapter.phase(), AnswerPhase::Errored);
        assert!(state.preview.content.contains("No delta received for 10s"));
    }
}
