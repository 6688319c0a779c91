//! Scripted [`SessionApi`] fake for tests (feature `test-utils`).
//!
//! Each session gets an in-memory byte channel. Tests push SSE frames
//! through a [`StreamFeed`] at whatever moment they choose, before or after
//! the stream client has opened the connection.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::domain::SessionId;
use crate::ports::{
    FrameByteStream, InitSessionRequest, InitSessionResponse, SessionApi, StreamKind,
    TransportError,
};

type ChunkResult = Result<Bytes, TransportError>;

/// Encode a JSON envelope as one SSE event.
pub fn sse_event(json: &str) -> Bytes {
    Bytes::from(format!("data: {json}\n\n"))
}

/// Sending half of one scripted session stream.
#[derive(Clone)]
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<ChunkResult>,
}

impl StreamFeed {
    /// Push one JSON envelope as an SSE event.
    pub fn frame(&self, json: &str) {
        let _ = self.tx.send(Ok(sse_event(json)));
    }

    /// Push raw bytes (split events, comments, malformed input).
    pub fn raw(&self, bytes: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(bytes.into()));
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, error: TransportError) {
        let _ = self.tx.send(Err(error));
    }
}

#[derive(Default)]
struct ScriptState {
    next_session: u64,
    init_error: Option<TransportError>,
    interrupt_error: Option<TransportError>,
    open_error: Option<TransportError>,
    init_requests: Vec<InitSessionRequest>,
    opened: Vec<(SessionId, StreamKind)>,
    interrupts: Vec<SessionId>,
    senders: HashMap<SessionId, mpsc::UnboundedSender<ChunkResult>>,
    receivers: HashMap<SessionId, mpsc::UnboundedReceiver<ChunkResult>>,
}

impl ScriptState {
    fn channel_for(&mut self, id: &SessionId) -> mpsc::UnboundedSender<ChunkResult> {
        if let Some(tx) = self.senders.get(id) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(id.clone(), tx.clone());
        self.receivers.insert(id.clone(), rx);
        tx
    }
}

/// In-memory backend that records every call.
#[derive(Default)]
pub struct ScriptedSessionApi {
    state: Mutex<ScriptState>,
}

impl ScriptedSessionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next `init_session` call will return.
    pub fn next_session_id(&self) -> SessionId {
        let state = self.state.lock().unwrap();
        SessionId::new(format!("session-{}", state.next_session + 1))
    }

    /// Feed for a session's stream (created on first use).
    pub fn feed(&self, id: &SessionId) -> StreamFeed {
        let tx = self.state.lock().unwrap().channel_for(id);
        StreamFeed { tx }
    }

    /// End a session's stream cleanly (HTTP body finished).
    pub fn close(&self, id: &SessionId) {
        self.state.lock().unwrap().senders.remove(id);
    }

    pub fn fail_init_with(&self, error: TransportError) {
        self.state.lock().unwrap().init_error = Some(error);
    }

    pub fn fail_interrupt_with(&self, error: TransportError) {
        self.state.lock().unwrap().interrupt_error = Some(error);
    }

    pub fn fail_open_with(&self, error: TransportError) {
        self.state.lock().unwrap().open_error = Some(error);
    }

    pub fn init_requests(&self) -> Vec<InitSessionRequest> {
        self.state.lock().unwrap().init_requests.clone()
    }

    pub fn opened(&self) -> Vec<(SessionId, StreamKind)> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Number of connections opened for one session.
    pub fn open_count(&self, id: &SessionId) -> usize {
        self.state
            .lock()
            .unwrap()
            .opened
            .iter()
            .filter(|(opened, _)| opened == id)
            .count()
    }

    pub fn interrupts(&self) -> Vec<SessionId> {
        self.state.lock().unwrap().interrupts.clone()
    }
}

#[async_trait]
impl SessionApi for ScriptedSessionApi {
    async fn init_session(
        &self,
        request: InitSessionRequest,
    ) -> Result<InitSessionResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.init_requests.push(request);
        if let Some(error) = state.init_error.clone() {
            return Err(error);
        }
        state.next_session += 1;
        Ok(InitSessionResponse {
            session_id: SessionId::new(format!("session-{}", state.next_session)),
        })
    }

    async fn open_stream(
        &self,
        session_id: &SessionId,
        kind: StreamKind,
    ) -> Result<FrameByteStream, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.opened.push((session_id.clone(), kind));
        if let Some(error) = state.open_error.clone() {
            return Err(error);
        }
        state.channel_for(session_id);
        let rx = state
            .receivers
            .remove(session_id)
            .unwrap_or_else(|| {
                // Reopened after the first receiver was taken: start a fresh channel.
                let (tx, rx) = mpsc::unbounded_channel();
                state.senders.insert(session_id.clone(), tx);
                rx
            });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn interrupt(&self, session_id: &SessionId) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.interrupts.push(session_id.clone());
        state.interrupt_error.clone().map_or(Ok(()), Err)
    }
}
