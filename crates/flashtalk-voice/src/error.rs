//! Voice error types.

/// Errors raised by the audio pipeline and socket decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    /// The platform cannot open a streaming media pipeline.
    #[error("Streaming audio is not supported: {0}")]
    Unsupported(String),

    /// The media backend failed to build a resource set.
    #[error("Failed to open media pipeline: {0}")]
    MediaOpen(String),

    /// Handing bytes to the media buffer failed.
    #[error("Failed to append audio: {0}")]
    Append(String),

    /// The playback element refused to start or resume.
    #[error("Playback failed: {0}")]
    Playback(String),

    /// The media pipeline reported a fatal error.
    #[error("Media pipeline error: {0}")]
    Media(String),

    /// A socket control message could not be decoded.
    #[error("Invalid voice signal: {0}")]
    InvalidSignal(String),
}

impl VoiceError {
    /// Whether the error means audio cannot work at all for this session.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
