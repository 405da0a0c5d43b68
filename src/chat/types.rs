//! Conversation and message data model
//!
//! These are the client-side views of the records held by the remote
//! store. Identifiers are opaque strings; the client never mints them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChatlineError;

/// Opaque conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChatId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Written locally and persisted by the send pipeline
    User,
    /// Produced by backend-side processing of a triggered action
    Assistant,
}

impl Role {
    /// Wire representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ChatlineError::Transport(format!(
                "Unknown message role: {}",
                other
            ))),
        }
    }
}

/// Conversation metadata as listed for the current identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique identifier
    pub id: ChatId,
    /// Display title
    pub title: String,
    /// Owner identity, when the backend returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Bumped on rename and on every message insertion
    pub updated_at: DateTime<Utc>,
    /// Number of messages, derived by the backend
    #[serde(default)]
    pub message_count: usize,
}

/// One immutable turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: MessageId,
    /// Owning conversation
    pub chat_id: ChatId,
    /// Author role, fixed at creation
    pub role: Role,
    /// Non-empty text content
    pub content: String,
    /// Creation time, the primary ordering key
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Key used to order a timeline: creation time, then identifier
    pub fn timeline_key(&self) -> (DateTime<Utc>, &MessageId) {
        (self.created_at, &self.id)
    }
}

/// Result of the bulk fetch channel: metadata plus full history
#[derive(Debug, Clone, PartialEq)]
pub struct ChatDetail {
    /// Conversation metadata
    pub chat: Chat,
    /// Messages ordered oldest-first
    pub messages: Vec<Message>,
}

/// Synchronous acknowledgment of the triggered reply action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// Whether backend processing was accepted
    pub success: bool,
    /// Optional diagnostic
    #[serde(default)]
    pub message: Option<String>,
    /// Optional reply text echoed by the action
    #[serde(default)]
    pub response: Option<String>,
}
