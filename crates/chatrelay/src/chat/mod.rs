//! Conversation model and request validation
//!
//! A conversation is an ordered list of role-tagged turns. It is built once
//! per request by the validator and replayed verbatim to the generator.

mod validate;

pub use validate::{ValidationError, parse_body, validate};

use serde::{Deserialize, Serialize};

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Convert role to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a wire role name, exact match only
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A single turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Role of the speaker
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Ordered sequence of turns; serializes as a plain JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    /// The most recent turn spoken by the user, if any
    pub fn latest_user_turn(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }
}

impl From<Vec<ConversationTurn>> for Conversation {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self::new(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_user_turn_picks_last() {
        let conversation = Conversation::new(vec![
            ConversationTurn::system("be brief"),
            ConversationTurn::user("first question"),
            ConversationTurn::assistant("first answer"),
            ConversationTurn::user("follow-up"),
            ConversationTurn::assistant("second answer"),
        ]);

        let latest = conversation.latest_user_turn().unwrap();
        assert_eq!(latest.content, "follow-up");
    }

    #[test]
    fn test_latest_user_turn_none_without_user() {
        let conversation = Conversation::new(vec![ConversationTurn::system("be brief")]);
        assert!(conversation.latest_user_turn().is_none());
    }

    #[test]
    fn test_conversation_serializes_as_array() {
        let conversation = Conversation::new(vec![
            ConversationTurn::system("rules"),
            ConversationTurn::user("hi"),
        ]);

        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "system", "content": "rules"},
                {"role": "user", "content": "hi"}
            ])
        );
    }

    #[test]
    fn test_role_parse_is_exact() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("User"), None);
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
