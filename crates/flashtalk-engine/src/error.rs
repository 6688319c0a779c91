//! Engine error types.

use flashtalk_core::TransportError;
use flashtalk_stream::StreamError;
use thiserror::Error;

/// Errors returned by [`crate::ConversationEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The prompt was empty after trimming.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// The backend refused to start a session.
    #[error("failed to start session: {0}")]
    Init(#[source] TransportError),

    /// The session started but its text stream could not be opened.
    #[error("failed to open text stream: {0}")]
    Stream(#[from] StreamError),
}
