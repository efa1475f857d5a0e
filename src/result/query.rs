//! Queries handed to plugins.

use std::path::PathBuf;

/// Content the user had selected when invoking the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Text(String),
    Files(Vec<PathBuf>),
}

impl Selection {
    /// Whether this selection needs a vision-capable command.
    pub fn requires_vision(&self) -> bool {
        matches!(self, Self::Files(_))
    }
}

/// How the query was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Typed into the query box.
    Input,
    /// Invoked on a selection.
    Selection(Selection),
}

/// A query routed to one plugin.
///
/// For input queries the raw text `"{trigger} {command} {search}"` has already
/// been split by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginQuery {
    pub kind: QueryKind,
    pub trigger_keyword: String,
    pub command: String,
    pub search: String,
}

impl PluginQuery {
    /// An input query.
    pub fn input(
        trigger_keyword: impl Into<String>,
        command: impl Into<String>,
        search: impl Into<String>,
    ) -> Self {
        Self {
            kind: QueryKind::Input,
            trigger_keyword: trigger_keyword.into(),
            command: command.into(),
            search: search.into(),
        }
    }

    /// A selection query.
    pub fn selection(selection: Selection) -> Self {
        Self {
            kind: QueryKind::Selection(selection),
            trigger_keyword: String::new(),
            command: String::new(),
            search: String::new(),
        }
    }

    /// The selection, if this is a selection query.
    pub fn selection_ref(&self) -> Option<&Selection> {
        match &self.kind {
            QueryKind::Selection(selection) => Some(selection),
            QueryKind::Input => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_vision_requirement() {
        assert!(Selection::Files(vec![PathBuf::from("/a.png")]).requires_vision());
        assert!(!Selection::Text("hello".into()).requires_vision());
    }

    #[test]
    fn test_input_query_has_no_selection() {
        let query = PluginQuery::input("ai", "translate", "bonjour");
        assert!(query.selection_ref().is_none());
        assert_eq!(query.command, "translate");
    }
}
