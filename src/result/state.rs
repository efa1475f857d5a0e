//! Displayed state of a single query result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ActionKind;

/// How preview content is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    #[default]
    Text,
    Markdown,
}

/// Which end of the preview the UI keeps in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollAnchor {
    #[default]
    Top,
    /// Follow the tail, used while text streams in.
    Bottom,
}

/// Preview pane content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preview {
    pub kind: PreviewKind,
    pub content: String,
    pub scroll_anchor: ScrollAnchor,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Preview {
    /// Plain text preview.
    pub fn text(content: impl Into<String>) -> Self {
        Self { kind: PreviewKind::Text, content: content.into(), ..Default::default() }
    }

    /// Markdown preview.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self { kind: PreviewKind::Markdown, content: content.into(), ..Default::default() }
    }

    /// Add a key/value shown next to the preview.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An action the user can run against a result.
#[derive(Debug, Clone)]
pub struct ResultAction {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    /// Run on plain Enter.
    pub is_default: bool,
    /// Keep the launcher open after running.
    pub prevent_auto_hide: bool,
    pub kind: ActionKind,
}

impl ResultAction {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            icon: None,
            is_default: false,
            prevent_auto_hide: false,
            kind,
        }
    }

    /// Mark as the default action.
    pub fn default_action(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Keep the launcher open after running.
    pub fn keep_open(mut self) -> Self {
        self.prevent_auto_hide = true;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Mutable record behind one displayed result.
///
/// Only the refresh step writes to it. Once `refresh_interval_ms` is zero the
/// scheduler stops calling the refresh step and the state is final.
#[derive(Debug, Clone, Default)]
pub struct ResultState {
    pub title: String,
    pub subtitle: String,
    pub icon: Option<String>,
    pub preview: Preview,
    /// Milliseconds until the next refresh; `0` is terminal.
    pub refresh_interval_ms: u64,
    /// Snapshot actions read instead of the live preview.
    pub context_data: String,
    pub actions: Vec<ResultAction>,
}

impl ResultState {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_refresh_interval(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = interval_ms;
        self
    }

    pub fn with_action(mut self, action: ResultAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Whether no further refresh will be scheduled.
    pub fn is_terminal(&self) -> bool {
        self.refresh_interval_ms == 0
    }

    /// Find an action by id.
    pub fn action(&self, id: &str) -> Option<&ResultAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Find an action by display name.
    pub fn action_named(&self, name: &str) -> Option<&ResultAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The action run on Enter: the one flagged default, else the first.
    pub fn default_action(&self) -> Option<&ResultAction> {
        self.actions.iter().find(|a| a.is_default).or_else(|| self.actions.first())
    }
}
