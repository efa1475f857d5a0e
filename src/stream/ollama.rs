//! Ollama local LLM backend.
//!
//! Streams `/api/chat` responses, which arrive as newline-delimited JSON.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use base64::Engine;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatDelta, ChatError, ChatModel, ChatStream, ConversationTurn, Role};

/// Ollama API backend.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a backend with default settings.
    ///
    /// Uses localhost:11434 by default.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
        }
    }

    /// Create with a specific base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Model used when a command does not name one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, model: &ChatModel, turns: &[ConversationTurn]) -> ChatRequest {
        let model = if model.name.is_empty() { self.model.clone() } else { model.name.clone() };
        let messages = turns
            .iter()
            .map(|turn| ChatMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: turn.text.clone(),
                images: turn.images.iter().filter_map(|p| encode_image(p)).collect(),
            })
            .collect();

        ChatRequest { model, messages, stream: true }
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn stream_chat(
        &self,
        model: &ChatModel,
        turns: &[ConversationTurn],
    ) -> Result<ChatStream, ChatError> {
        let request = self.build_request(model, turns);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::ProviderNotAvailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::ApiError(format!("Ollama API error ({status}): {body}")));
        }

        let body: ByteStream =
            Box::pin(response.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec())));
        Ok(ndjson_deltas(body))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Read an image attachment as base64. Unreadable images are skipped.
fn encode_image(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable image");
            None
        }
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

struct LineReader {
    body: ByteStream,
    buffer: Vec<u8>,
    done: bool,
}

/// Split a byte stream into lines and parse each one as a chat chunk.
fn ndjson_deltas(body: ByteStream) -> ChatStream {
    let reader = LineReader { body, buffer: Vec::new(), done: false };
    Box::pin(futures::stream::unfold(reader, |mut reader| async move {
        loop {
            if reader.done {
                return None;
            }

            if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let item = parse_chat_line(line);
                if matches!(item, Ok(ChatDelta { finished: true, .. }) | Err(_)) {
                    reader.done = true;
                }
                return Some((item, reader));
            }

            match reader.body.next().await {
                Some(Ok(bytes)) => reader.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    reader.done = true;
                    return Some((Err(ChatError::Stream(e.to_string())), reader));
                }
                None => {
                    reader.done = true;
                    let rest = String::from_utf8_lossy(&reader.buffer).trim().to_string();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((parse_chat_line(&rest), reader));
                }
            }
        }
    }))
}

/// Parse one NDJSON line of an `/api/chat` response.
fn parse_chat_line(line: &str) -> Result<ChatDelta, ChatError> {
    let chunk: ChatChunk =
        serde_json::from_str(line).map_err(|e| ChatError::Stream(format!("bad chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::ApiError(error));
    }

    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok(ChatDelta { text, finished: chunk.done })
}

/// Ollama chat request.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// One streamed response line.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}
