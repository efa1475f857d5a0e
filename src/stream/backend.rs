//! Generation backend seam.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::ConversationTurn;

/// Model selection for a chat request.
///
/// Stored in settings as a JSON string, e.g.
/// `{"Provider":"ollama","Name":"llama3.2"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatModel {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
}

impl ChatModel {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self { provider: provider.into(), name: name.into() }
    }

    /// Parse a model setting; anything unparsable means "backend default".
    pub fn from_setting(value: &str) -> Self {
        if value.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(value).unwrap_or_else(|e| {
            tracing::warn!(value, error = %e, "Ignoring unparsable model setting");
            Self::default()
        })
    }
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.provider.is_empty(), self.name.is_empty()) {
            (true, true) => f.write_str("default"),
            (true, false) => f.write_str(&self.name),
            (false, true) => f.write_str(&self.provider),
            (false, false) => write!(f, "{} - {}", self.provider, self.name),
        }
    }
}

/// One chunk of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDelta {
    pub text: String,
    /// Last chunk of the answer.
    pub finished: bool,
}

/// Backend errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("No delta received for {}s", .0.as_secs())]
    Stalled(Duration),
}

/// A stream of answer deltas.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, ChatError>> + Send>>;

/// A streaming chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a chat and stream the answer.
    async fn stream_chat(
        &self,
        model: &ChatModel,
        turns: &[ConversationTurn],
    ) -> Result<ChatStream, ChatError>;

    /// Backend name.
    fn name(&self) -> &str;
}

/// A step of a [`ScriptedBackend`] answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Delta(String),
    Pause(Duration),
    Fail(String),
    /// Never yield again.
    Hang,
}

/// Backend that replays a fixed answer. Records every request it gets.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    requests: Mutex<Vec<(ChatModel, Vec<ConversationTurn>)>>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps, requests: Mutex::new(Vec::new()) }
    }

    /// Answer with `deltas`, the last one flagged finished.
    pub fn from_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(deltas.into_iter().map(|d| ScriptStep::Delta(d.into())).collect())
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<(ChatModel, Vec<ConversationTurn>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_chat(
        &self,
        model: &ChatModel,
        turns: &[ConversationTurn],
    ) -> Result<ChatStream, ChatError> {
        self.requests.lock().push((model.clone(), turns.to_vec()));
        Ok(replay(self.steps.iter().cloned().collect()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Offline backend that streams the last user turn back word by word.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    pause: Duration,
}

impl EchoBackend {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(30))
    }
}

#[async_trait]
impl ChatBackend for EchoBackend {
    async fn stream_chat(
        &self,
        _model: &ChatModel,
        turns: &[ConversationTurn],
    ) -> Result<ChatStream, ChatError> {
        let prompt = turns
            .iter()
            .rev()
            .find(|t| t.role == super::Role::User)
            .map(|t| t.text.clone())
            .unwrap_or_default();

        let mut steps = VecDeque::new();
        for word in prompt.split_inclusive(' ') {
            steps.push_back(ScriptStep::Pause(self.pause));
            steps.push_back(ScriptStep::Delta(word.to_string()));
        }
        Ok(replay(steps))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

fn replay(steps: VecDeque<ScriptStep>) -> ChatStream {
    Box::pin(futures::stream::unfold(steps, |mut steps| async move {
        loop {
            match steps.pop_front()? {
                ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                ScriptStep::Hang => futures::future::pending::<()>().await,
                ScriptStep::Fail(message) => {
                    steps.clear();
                    return Some((Err(ChatError::Stream(message)), steps));
                }
                ScriptStep::Delta(text) => {
                    let finished = !steps
                        .iter()
                        .any(|s| matches!(s, ScriptStep::Delta(_) | ScriptStep::Fail(_)));
                    return Some((Ok(ChatDelta { text, finished }), steps));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_model_from_setting() {
        let model = ChatModel::from_setting(r#"{"Provider":"ollama","Name":"llava"}"#);
        assert_eq!(model, ChatModel::new("ollama", "llava"));
        assert_eq!(model.to_string(), "ollama - llava");

        assert_eq!(ChatModel::from_setting(""), ChatModel::default());
        assert_eq!(ChatModel::from_setting("not json"), ChatModel::default());
    }

    #[tokio::test]
    async fn test_scripted_backend_flags_last_delta() {
        let backend = ScriptedBackend::from_deltas(["Hel", "lo"]);
        let stream = backend.stream_chat(&ChatModel::default(), &[]).await.unwrap();
        let deltas: Vec<_> = stream.collect().await;

        assert_eq!(
            deltas,
            vec![
                Ok(ChatDelta { text: "Hel".into(), finished: false }),
                Ok(ChatDelta { text: "lo".into(), finished: true }),
            ]
        );
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_ends_stream() {
        let backend = ScriptedBackend::new(vec![
            ScriptStep::Delta("partial".into()),
            ScriptStep::Fail("connection reset".into()),
            ScriptStep::Delta("never".into()),
        ]);
        let mut stream = backend.stream_chat(&ChatModel::default(), &[]).await.unwrap();

        assert!(matches!(stream.next().await, Some(Ok(ChatDelta { finished: false, .. }))));
        assert!(matches!(stream.next().await, Some(Err(ChatError::Stream(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_backend_streams_last_user_turn() {
        let backend = EchoBackend::default();
        let turns = vec![ConversationTurn::user("first"), ConversationTurn::user("hello there")];
        let stream = backend.stream_chat(&ChatModel::default(), &turns).await.unwrap();
        let text: String = stream.map(|d| d.unwrap().text).collect::<Vec<_>>().await.concat();

        assert_eq!(text, "hello there");
    }
}
