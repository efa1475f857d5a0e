//! AI commands: configurable prompts answered by a streaming backend.
//!
//! Commands live in the `commands` setting as a JSON array:
//!
//! ```json
//! [{"name": "Translate", "command": "tr", "model": "{\"Provider\":\"ollama\",\"Name\":\"llama3.2\"}",
//!   "prompt": "Translate to English: %s", "vision": false}]
//! ```
//!
//! Two entry points use them. A selection query offers every command that
//! accepts the selection type and starts generating once the user runs it.
//! An input query `ai <command> <text>` chats right away, splitting the
//! prompt into alternating user/assistant turns.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::host::HostServices;
use crate::plugin::{Metadata, MetadataCommand, MetadataWithDirectory};
use crate::result::{
    ActionKind, PluginQuery, Preview, QueryKind, QueryResult, ResultAction, ResultBehavior,
    ResultState, Selection,
};
use crate::settings::SettingsStore;
use crate::stream::{
    fill_prompt, split_prompt_template, AnswerProfile, ChatBackend, ChatModel, ConversationTurn,
    StallPolicy, StreamingAdapter, ENTER_TO_START_TEXT,
};

/// Identity of the AI command plugin.
pub const AI_COMMAND_PLUGIN_ID: &str = "c9910664-1c28-47ae-bad6-e7332a02d471";

/// Trigger keyword for input queries.
pub const AI_TRIGGER_KEYWORD: &str = "ai";

/// Setting key holding the command table.
pub const COMMANDS_SETTING_KEY: &str = "commands";

const AI_ICON: &str = "ai";

/// One configured AI command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSetting {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    /// JSON-encoded [`ChatModel`].
    #[serde(default)]
    pub model: String,
    /// Prompt template; `%s` is replaced by the input.
    #[serde(default)]
    pub prompt: String,
    /// Operates on image selections instead of text.
    #[serde(default)]
    pub vision: bool,
}

impl CommandSetting {
    pub fn ai_model(&self) -> ChatModel {
        ChatModel::from_setting(&self.model)
    }

    /// Whether this command can run on `selection`.
    pub fn accepts(&self, selection: &Selection) -> bool {
        self.vision == selection.requires_vision()
    }
}

/// Parse the command table setting. An empty value means no commands.
pub fn parse_commands(value: &str) -> Result<Vec<CommandSetting>, serde_json::Error> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(value)
}

/// The AI command plugin.
pub struct AiCommandPlugin {
    backend: Arc<dyn ChatBackend>,
    settings: Arc<dyn SettingsStore>,
    host: Arc<dyn HostServices>,
    refresh_interval_ms: u64,
    stall: StallPolicy,
}

impl std::fmt::Debug for AiCommandPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiCommandPlugin")
            .field("backend", &self.backend.name())
            .field("refresh_interval_ms", &self.refresh_interval_ms)
            .finish()
    }
}

impl AiCommandPlugin {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        settings: Arc<dyn SettingsStore>,
        host: Arc<dyn HostServices>,
    ) -> Self {
        Self { backend, settings, host, refresh_interval_ms: 100, stall: StallPolicy::none() }
    }

    /// Polling interval of streaming results.
    pub fn with_refresh_interval(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = interval_ms.max(1);
        self
    }

    pub fn with_stall_policy(mut self, stall: StallPolicy) -> Self {
        self.stall = stall;
        self
    }

    /// Descriptor of this plugin.
    pub fn metadata() -> MetadataWithDirectory {
        let metadata = Metadata {
            id: AI_COMMAND_PLUGIN_ID.to_string(),
            name: "AI Commands".to_string(),
            author: "palhost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            min_host_version: String::new(),
            runtime: "native".to_string(),
            entry: String::new(),
            description: "Run configured prompts against a language model".to_string(),
            website: String::new(),
            icon: AI_ICON.to_string(),
            trigger_keywords: vec![AI_TRIGGER_KEYWORD.to_string()],
            commands: Vec::new(),
            supported_os: vec!["Windows".into(), "Macos".into(), "Linux".into()],
            features: vec![
                serde_json::json!({"Name": "ignoreAutoScore"}),
                serde_json::json!({"Name": "querySelection"}),
                serde_json::json!({"Name": "ai"}),
            ],
        };
        MetadataWithDirectory::new(metadata, PathBuf::new())
    }

    /// Register query commands now and whenever the command table changes.
    pub fn init(&self) {
        let host = Arc::clone(&self.host);
        self.settings.on_setting_changed(
            COMMANDS_SETTING_KEY,
            Arc::new(move |_key, value| {
                tracing::info!(value, "AI command setting changed");
                register_query_commands(host.as_ref(), value);
            }),
        );

        let current = self.settings.get_setting(COMMANDS_SETTING_KEY);
        if !current.is_empty() {
            register_query_commands(self.host.as_ref(), &current);
        }
    }

    /// Answer a query.
    pub fn query(&self, query: &PluginQuery) -> Vec<QueryResult> {
        match &query.kind {
            QueryKind::Selection(selection) => self.query_selection(selection),
            QueryKind::Input if query.command.is_empty() => self.list_commands(query),
            QueryKind::Input => self.query_command(query),
        }
    }

    fn commands(&self) -> Result<Vec<CommandSetting>, serde_json::Error> {
        parse_commands(&self.settings.get_setting(COMMANDS_SETTING_KEY))
    }

    /// One lazily started result per command accepting the selection.
    fn query_selection(&self, selection: &Selection) -> Vec<QueryResult> {
        let commands = match self.commands() {
            Ok(commands) => commands,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse AI commands");
                return Vec::new();
            }
        };

        let paste_target = self.host.active_window_name();
        commands
            .iter()
            .filter(|command| command.accepts(selection))
            .map(|command| {
                let turn = match selection {
                    Selection::Files(paths) => {
                        ConversationTurn::user(command.prompt.clone()).with_images(paths.clone())
                    }
                    Selection::Text(text) => {
                        ConversationTurn::user(fill_prompt(&command.prompt, text))
                    }
                };

                let adapter =
                    StreamingAdapter::new(Arc::clone(&self.backend), command.ai_model(), vec![turn])
                        .with_profile(AnswerProfile::on_demand(paste_target.clone()))
                        .with_stall_policy(self.stall);

                let state = ResultState::new(command.name.clone())
                    .with_subtitle(command.ai_model().to_string())
                    .with_icon(AI_ICON)
                    .with_preview(Preview::text(ENTER_TO_START_TEXT))
                    .with_refresh_interval(self.refresh_interval_ms)
                    .with_action(
                        ResultAction::new(
                            "Run",
                            ActionKind::StartGeneration(adapter.start_signal()),
                        )
                        .default_action()
                        .keep_open(),
                    );

                QueryResult::new(state, ResultBehavior::StreamingAnswer(Box::new(adapter)))
            })
            .collect()
    }

    fn list_commands(&self, query: &PluginQuery) -> Vec<QueryResult> {
        let commands = match self.commands() {
            Ok(commands) => commands,
            Err(e) => return vec![failed_to_get_commands(&e)],
        };
        if commands.is_empty() {
            return vec![info_result("No AI commands configured")];
        }

        commands
            .iter()
            .map(|command| {
                let change = format!("{} {} ", query.trigger_keyword, command.command);
                QueryResult::fixed(
                    ResultState::new(command.command.clone())
                        .with_subtitle(command.name.clone())
                        .with_icon(AI_ICON)
                        .with_action(
                            ResultAction::new("Run", ActionKind::ChangeQuery(change)).keep_open(),
                        ),
                )
            })
            .collect()
    }

    /// Chat with the command named in the query.
    fn query_command(&self, query: &PluginQuery) -> Vec<QueryResult> {
        if query.search.is_empty() {
            return vec![info_result("Type something to start chatting")];
        }

        let commands = match self.commands() {
            Ok(commands) => commands,
            Err(e) => return vec![failed_to_get_commands(&e)],
        };
        if commands.is_empty() {
            return vec![info_result("No AI commands configured")];
        }

        let Some(command) = commands.iter().find(|c| c.command == query.command) else {
            return vec![info_result("AI command not found")];
        };
        if command.prompt.is_empty() {
            return vec![info_result("AI command has an empty prompt")];
        }

        let turns = split_prompt_template(&command.prompt, &query.search);
        let adapter = StreamingAdapter::new(Arc::clone(&self.backend), command.ai_model(), turns)
            .with_profile(AnswerProfile::chat())
            .with_stall_policy(self.stall);

        let mut state = ResultState::new(format!("Chat with {}", command.name))
            .with_subtitle(command.ai_model().to_string())
            .with_icon(AI_ICON)
            .with_preview(Preview::markdown(""))
            .with_refresh_interval(self.refresh_interval_ms)
            .with_action(ResultAction::new("Copy", ActionKind::CopyContext).with_icon("copy"));
        if let Some(window) = self.host.active_window_name() {
            state = state.with_action(ResultAction::new(
                format!("Paste to {window}"),
                ActionKind::PasteContext,
            ));
        }

        vec![QueryResult::new(state, ResultBehavior::StreamingAnswer(Box::new(adapter)))]
    }
}

fn register_query_commands(host: &dyn HostServices, value: &str) {
    match parse_commands(value) {
        Ok(commands) => {
            let commands: Vec<MetadataCommand> = commands
                .into_iter()
                .map(|c| MetadataCommand { command: c.command, description: c.name })
                .collect();
            tracing::info!(count = commands.len(), "Registering AI query commands");
            host.register_query_commands(AI_COMMAND_PLUGIN_ID, commands);
        }
        Err(e) => tracing::error!(error = %e, "Failed to parse AI commands"),
    }
}

fn info_result(title: &str) -> QueryResult {
    QueryResult::fixed(ResultState::new(title).with_icon(AI_ICON))
}

fn failed_to_get_commands(error: &serde_json::Error) -> QueryResult {
    QueryResult::fixed(
        ResultState::new("Failed to get AI commands")
            .with_subtitle(error.to_string())
            .with_icon(AI_ICON),
    )
}
