//! Conversation domain types.
//!
//! The [`Conversation`] exclusively owns its [`Message`]s. Sessions only
//! refer to the assistant message they drive through its `session_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionId;

/// Locally assigned message identifier (stable for the lifetime of a view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Parse a role from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Convert role to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conversation entry as shown in a message bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    /// Generation still in flight for this bubble.
    pub pending: bool,
    /// Back-reference to the owning session (assistant messages only).
    pub session_id: Option<SessionId>,
    /// Rendered with an error marker.
    pub error: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A finished user message.
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            pending: false,
            session_id: None,
            error: false,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant placeholder awaiting its session.
    pub fn pending_assistant(id: MessageId) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            pending: true,
            session_id: None,
            error: false,
            created_at: Utc::now(),
        }
    }

    /// Whether history replay should re-attach this message to its session.
    #[must_use]
    pub fn has_open_session(&self) -> bool {
        self.role == MessageRole::Assistant
            && self.session_id.is_some()
            && self.pending
            && !self.error
    }
}

/// Ordered list of messages for one flashcard view.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next message id.
    pub fn next_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }

    /// Append a message, keeping id allocation ahead of any imported id.
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.next_id = self.next_id.max(id.0);
        self.messages.push(message);
        id
    }

    /// Replace the whole list (history load).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.next_id = messages.iter().map(|m| m.id.0).max().unwrap_or(0);
        self.messages = messages;
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.get(id).is_some()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
