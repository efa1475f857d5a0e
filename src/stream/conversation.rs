//! Conversation turns and prompt templates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Token that splits a prompt template into alternating turns.
pub const TURN_SEPARATOR: &str = "{wox:new_ai_conversation}";

/// Placeholder replaced by the user's input.
pub const INPUT_PLACEHOLDER: &str = "%s";

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    /// Image attachments, only sent to vision models.
    pub images: Vec<PathBuf>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), images: Vec::new() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), images: Vec::new() }
    }

    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }
}

/// Substitute `input` for every `%s` in `template`.
pub fn fill_prompt(template: &str, input: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, input)
}

/// Split a prompt template into turns.
///
/// Segments between [`TURN_SEPARATOR`] tokens alternate user, assistant,
/// user... starting with the user. Each segment is filled with `input`.
pub fn split_prompt_template(template: &str, input: &str) -> Vec<ConversationTurn> {
    template
        .split(TURN_SEPARATOR)
        .enumerate()
        .map(|(i, segment)| {
            let text = fill_prompt(segment, input);
            if i % 2 == 0 {
                ConversationTurn::user(text)
            } else {
                ConversationTurn::assistant(text)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_alternates_roles() {
        let template = "A %s{wox:new_ai_conversation}B{wox:new_ai_conversation}C";
        let turns = split_prompt_template(template, "x");

        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("A x"),
                ConversationTurn::assistant("B"),
                ConversationTurn::user("C"),
            ]
        );
    }

    #[test]
    fn test_template_without_separator_is_one_user_turn() {
        let turns = split_prompt_template("Translate to French: %s", "good morning");
        assert_eq!(turns, vec![ConversationTurn::user("Translate to French: good morning")]);
    }

    #[test]
    fn test_fill_prompt_replaces_every_placeholder() {
        assert_eq!(fill_prompt("%s and %s", "tea"), "tea and tea");
        assert_eq!(fill_prompt("no placeholder", "tea"), "no placeholder");
    }
}
