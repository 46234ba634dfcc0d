//! Request body validation
//!
//! Runs before any enrichment or generation work and has no side effects.

use serde_json::Value;
use thiserror::Error;

use super::{Conversation, ConversationTurn, Role};

/// Validation failure; always surfaced as HTTP 400
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid messages format: {reason}. Expected array of {{role, content}} objects")]
    InvalidFormat { reason: String },
}

impl ValidationError {
    fn invalid(reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ValidationError::InvalidFormat { reason } => reason,
        }
    }
}

/// Parse raw request bytes into JSON
pub fn parse_body(bytes: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::invalid(format!("request body is not valid JSON ({e})")))
}

/// Validate a request body and build the conversation it carries.
///
/// `messages` must be a non-empty array whose elements each carry a `role`
/// of `system`, `user` or `assistant` and a string `content`. Extra fields
/// are ignored and turn order is preserved.
pub fn validate(body: &Value) -> Result<Conversation, ValidationError> {
    let object = body
        .as_object()
        .ok_or_else(|| ValidationError::invalid("request body must be a JSON object"))?;

    let messages = match object.get("messages") {
        None | Some(Value::Null) => return Err(ValidationError::invalid("`messages` is required")),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ValidationError::invalid("`messages` must be an array")),
    };

    if messages.is_empty() {
        return Err(ValidationError::invalid(
            "`messages` must contain at least one turn",
        ));
    }

    let turns = messages
        .iter()
        .enumerate()
        .map(|(index, item)| parse_turn(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Conversation::new(turns))
}

fn parse_turn(index: usize, item: &Value) -> Result<ConversationTurn, ValidationError> {
    let turn = item
        .as_object()
        .ok_or_else(|| ValidationError::invalid(format!("messages[{index}] must be an object")))?;

    let role = turn
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .ok_or_else(|| {
            ValidationError::invalid(format!(
                "messages[{index}].role must be one of system, user, assistant"
            ))
        })?;

    let content = turn.get("content").and_then(Value::as_str).ok_or_else(|| {
        ValidationError::invalid(format!("messages[{index}].content must be a string"))
    })?;

    Ok(ConversationTurn::new(role, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_conversation_preserves_order() {
        let body = json!({
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {"role": "user", "content": ""}
            ]
        });

        let conversation = validate(&body).unwrap();
        let roles: Vec<Role> = conversation.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(conversation.turns()[3].content, "");
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let body = json!({
            "model": "ignored",
            "messages": [{"role": "user", "content": "Hi", "name": "bob"}]
        });

        let conversation = validate(&body).unwrap();
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_missing_messages() {
        let err = validate(&json!({})).unwrap_err();
        assert!(err.reason().contains("required"));
    }

    #[test]
    fn test_messages_not_array() {
        let err = validate(&json!({"messages": "hello"})).unwrap_err();
        assert!(err.reason().contains("must be an array"));
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = validate(&json!({"messages": []})).unwrap_err();
        assert!(err.reason().contains("at least one"));
    }

    #[test]
    fn test_body_not_object() {
        let err = validate(&json!([{"role": "user", "content": "hi"}])).unwrap_err();
        assert!(err.reason().contains("JSON object"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let body = json!({"messages": [{"role": "tool", "content": "x"}]});
        let err = validate(&body).unwrap_err();
        assert_eq!(
            err.reason(),
            "messages[0].role must be one of system, user, assistant"
        );
    }

    #[test]
    fn test_missing_role_rejected() {
        let body = json!({"messages": [{"role": "user", "content": "ok"}, {"content": "x"}]});
        let err = validate(&body).unwrap_err();
        assert!(err.reason().starts_with("messages[1].role"));
    }

    #[test]
    fn test_non_string_content_rejected() {
        for content in [json!(42), json!(null), json!(["a"]), json!({"text": "a"})] {
            let body = json!({"messages": [{"role": "user", "content": content}]});
            let err = validate(&body).unwrap_err();
            assert_eq!(err.reason(), "messages[0].content must be a string");
        }
    }

    #[test]
    fn test_non_object_element_rejected() {
        let body = json!({"messages": ["hello"]});
        let err = validate(&body).unwrap_err();
        assert_eq!(err.reason(), "messages[0] must be an object");
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        let err = parse_body(b"{not json").unwrap_err();
        assert!(err.reason().contains("not valid JSON"));
    }

    #[test]
    fn test_error_message_mentions_expected_shape() {
        let err = validate(&json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid messages format: `messages` is required. Expected array of {role, content} objects"
        );
    }
}
