//! Error types for text streaming.

use flashtalk_core::{SessionId, TransportError};
use thiserror::Error;

/// Errors returned by [`crate::TextStreamClient::subscribe`] and
/// [`crate::HttpSessionApi`] construction.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A subscription for this session is already running.
    #[error("session {0} already has an open text subscription")]
    AlreadySubscribed(SessionId),

    /// The registry does not track this session.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The session reached a terminal status; there is nothing to stream.
    #[error("session {0} is already finished")]
    SessionFinished(SessionId),

    /// The subscription was disposed before the connection opened.
    #[error("subscription for session {0} was cancelled while connecting")]
    Cancelled(SessionId),

    /// Opening the connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configured base URL cannot be used.
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// A frame that could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid JSON: {reason}")]
    InvalidJson {
        /// Discriminator from the SSE `event:` line, if any.
        event: Option<String>,
        reason: String,
    },

    #[error("frame has no event discriminator")]
    MissingEvent,

    #[error("invalid payload for '{event}' frame: {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl FrameError {
    /// Whether the session must be failed instead of skipping the frame.
    ///
    /// Losing a `complete` or `existing_content` frame would leave the
    /// message wrong forever, so those fail the session. A bad delta is
    /// only logged.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        let event = match self {
            Self::InvalidJson { event, .. } => event.as_deref(),
            Self::InvalidPayload { event, .. } => Some(event.as_str()),
            Self::MissingEvent => None,
        };
        matches!(event, Some("complete" | "existing_content"))
    }
}
