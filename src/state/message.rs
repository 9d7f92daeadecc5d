//! Chat message model for the per-session transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a chat message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// User input.
    User,
    /// Agent response.
    Agent,
}

impl ChatRole {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            _ => Err(value.to_string()),
        }
    }
}

/// One turn of conversation, immutable once created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the speaker.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
    /// Timestamp assigned at append time.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current UTC instant.
    #[must_use]
    pub fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Web-facing projection of a chat message with its chronological index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    /// Chronological index within the transcript (0 = oldest).
    pub id: usize,
    /// Role of the speaker.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
    /// Append timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Project an oldest-first message slice into indexed records.
#[must_use]
pub fn format_messages(messages: &[ChatMessage]) -> Vec<ChatMessageRecord> {
    messages
        .iter()
        .enumerate()
        .map(|(id, message)| ChatMessageRecord {
            id,
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [ChatRole::User, ChatRole::Agent] {
            let parsed: ChatRole = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("system".parse::<ChatRole>().is_err());
    }

    #[test]
    fn message_serde_round_trip_preserves_fields() {
        let message = ChatMessage::now(ChatRole::Agent, "Welcome!");
        let json = serde_json::to_string(&message).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn format_messages_assigns_chronological_ids() {
        let messages = vec![
            ChatMessage::now(ChatRole::User, "hi"),
            ChatMessage::now(ChatRole::Agent, "hello"),
        ];
        let records = format_messages(&messages);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[0].role, ChatRole::User);
        assert_eq!(records[1].id, 1);
        assert_eq!(records[1].content, "hello");
    }
}
