//! Session domain types.
//!
//! A [`Session`] is the transient control object for one AI generation. It
//! is created once the backend has assigned an identifier and is bound to
//! exactly one assistant [`Message`](super::Message) through that identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, server-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a server-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no frame received yet.
    Pending,
    /// At least one content frame has been applied.
    Streaming,
    /// The backend delivered a `complete` frame.
    Complete,
    /// Transport, protocol, or server failure.
    Error,
    /// Cancelled by an explicit interrupt.
    Interrupted,
}

impl SessionStatus {
    /// Whether no further frames may mutate the session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Interrupted)
    }

    /// Label used in logs and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of the flashcard a prompt is grounded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContextMode {
    /// The whole flashcard.
    #[default]
    Card,
    /// An inline document reference inside the card.
    Chunk {
        #[serde(rename = "chunkId")]
        chunk_id: String,
    },
}

impl ContextMode {
    /// The chunk reference, if this prompt targets one.
    #[must_use]
    pub fn chunk_id(&self) -> Option<&str> {
        match self {
            Self::Card => None,
            Self::Chunk { chunk_id } => Some(chunk_id),
        }
    }
}

/// The card context a session was started for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub card_context_id: String,
    pub chunk_id: Option<String>,
}

impl SessionContext {
    pub fn new(card_context_id: impl Into<String>, chunk_id: Option<String>) -> Self {
        Self {
            card_context_id: card_context_id.into(),
            chunk_id,
        }
    }
}

/// One AI generation in progress or already finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub card_context_id: String,
    pub chunk_id: Option<String>,
    pub status: SessionStatus,
    accumulated_text: String,
    pub has_audio: bool,
}

impl Session {
    /// A freshly created session in `pending` state.
    pub fn new(session_id: SessionId, context: SessionContext, has_audio: bool) -> Self {
        Self {
            session_id,
            card_context_id: context.card_context_id,
            chunk_id: context.chunk_id,
            status: SessionStatus::Pending,
            accumulated_text: String::new(),
            has_audio,
        }
    }

    /// Text received so far.
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Append a delta. Ignored once the session is terminal.
    pub fn append_delta(&mut self, delta: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.accumulated_text.push_str(delta);
        self.status = SessionStatus::Streaming;
        true
    }

    /// Seed the text from a late-join recovery snapshot.
    ///
    /// Replaces rather than appends so deltas streamed before this client
    /// attached are not counted twice.
    pub fn seed_existing(&mut self, content: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.accumulated_text = content;
        self.status = SessionStatus::Streaming;
        true
    }

    /// Reach `complete`, replacing the text once with the authoritative
    /// payload when the backend supplied one.
    pub fn complete(&mut self, authoritative: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if let Some(text) = authoritative {
            self.accumulated_text = text;
        }
        self.status = SessionStatus::Complete;
        true
    }

    /// Reach `error`, keeping whatever text has accumulated.
    pub fn fail(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Error;
        true
    }

    /// Reach `interrupted`, keeping whatever text has accumulated.
    pub fn interrupt(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Interrupted;
        true
    }
}
