//! Backend session API port.
//!
//! # Design Rules
//!
//! - The port describes the boundary contract only: the engine never sees
//!   URLs, headers, or HTTP status handling.
//! - Streams are returned as raw bytes; framing is the stream client's job.
//! - `interrupt` is fire-and-forget from the engine's point of view. Callers
//!   log failures and carry on with local cleanup.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ContextMode, SessionId};

/// Close codes that mean the server ended the stream on purpose.
pub const CLEAN_CLOSE_CODES: [u16; 2] = [1000, 1001];

/// Raw byte stream of one incremental-delivery connection.
pub type FrameByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Body of `POST /session/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSessionRequest {
    pub context_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub prompt: String,
    pub context_mode: ContextMode,
    /// Ask the backend to also synthesise speech over the socket channel.
    pub voice: bool,
}

/// Response of `POST /session/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSessionResponse {
    pub session_id: SessionId,
}

/// Which streaming endpoint to open for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Normal delta stream for a session this client started.
    Live,
    /// Status stream for late join: emits `existing_content` once, then
    /// behaves like [`StreamKind::Live`].
    Recovery,
}

impl StreamKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Recovery => "recovery",
        }
    }
}

/// Transport-level failures reported by a [`SessionApi`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server closed the connection with a close code.
    #[error("connection closed by server (code {code})")]
    Closed { code: u16 },

    /// Non-success HTTP status.
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// Connection dropped or could not be established.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether the server ended the connection intentionally.
    ///
    /// A clean close is benign: the session already reached a terminal state
    /// through a `complete` frame or an explicit interrupt.
    #[must_use]
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed { code } if CLEAN_CLOSE_CODES.contains(code))
    }
}

/// Backend session lifecycle operations consumed by the engine.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Start a generation and return its server-assigned id.
    async fn init_session(
        &self,
        request: InitSessionRequest,
    ) -> Result<InitSessionResponse, TransportError>;

    /// Open the incremental-delivery stream for a session.
    async fn open_stream(
        &self,
        session_id: &SessionId,
        kind: StreamKind,
    ) -> Result<FrameByteStream, TransportError>;

    /// Ask the backend to stop generating for a session.
    async fn interrupt(&self, session_id: &SessionId) -> Result<(), TransportError>;
}
