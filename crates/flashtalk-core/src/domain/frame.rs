//! Decoded text-stream frames.
//!
//! These are the semantic events of the incremental-delivery channel, after
//! transport decoding. Parsing from the wire lives in `flashtalk-stream`.

/// One decoded frame of the text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFrame {
    /// Late-join seed: replaces the accumulated text wholesale.
    ExistingContent(String),
    /// Incremental delta appended to the accumulated text.
    Delta(String),
    /// Generation finished; carries the authoritative final text if sent.
    Complete(Option<String>),
    /// Backend reported a generation failure.
    Error(String),
}

impl TextFrame {
    /// Wire discriminator for this frame.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ExistingContent(_) => "existing_content",
            Self::Delta(_) => "message",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }
}

/// What applying a frame did to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Content changed, the stream stays open.
    Applied,
    /// The session reached a terminal state; the stream should close.
    Terminated,
    /// The session was unknown or already terminal; nothing changed.
    Dropped,
}

impl FrameOutcome {
    /// Whether the reader should stop after this frame.
    #[must_use]
    pub const fn closes_stream(self) -> bool {
        matches!(self, Self::Terminated)
    }
}
