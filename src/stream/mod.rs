//! Streaming answers.
//!
//! Turns a token stream from a generation backend into refresh steps for a
//! displayed result. The backend runs on a background task
//! ([`StreamSession`]) and the [`StreamingAdapter`] applies whatever deltas
//! have arrived each time the result is refreshed.

mod adapter;
mod backend;
mod conversation;
#[cfg(feature = "ai")]
mod ollama;
mod session;

pub use adapter::{
    AnswerPhase, AnswerProfile, StreamingAdapter, ANSWERING_TEXT, ENTER_TO_START_TEXT,
};
pub use backend::{
    ChatBackend, ChatDelta, ChatError, ChatModel, ChatStream, EchoBackend, ScriptStep,
    ScriptedBackend,
};
pub use conversation::{
    fill_prompt, split_prompt_template, ConversationTurn, Role, INPUT_PLACEHOLDER, TURN_SEPARATOR,
};
#[cfg(feature = "ai")]
pub use ollama::OllamaBackend;
pub use session::{SessionEvent, StallPolicy, StreamSession};
