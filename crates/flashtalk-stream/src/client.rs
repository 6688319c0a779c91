//! `TextStreamClient`: one incremental-delivery connection per session.
//!
//! `subscribe` claims the session's single subscription slot in the
//! registry, opens the stream through the [`SessionApi`] port, and spawns a
//! pump task that decodes frames and applies them through the registry.
//! The registry owns every mutation, including the terminal-status fence,
//! so the pump never writes to a message directly.

use std::ops::ControlFlow;
use std::sync::Arc;

use flashtalk_core::{
    Disposable, FrameByteStream, SessionApi, SessionId, SessionRegistry, StreamKind,
    SubscriptionClaim,
};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::StreamError;
use crate::frame::parse_frame;
use crate::sse::{SseDecoder, SseEvent};

/// Opens and pumps text subscriptions.
#[derive(Clone)]
pub struct TextStreamClient {
    api: Arc<dyn SessionApi>,
    registry: SessionRegistry,
}

impl TextStreamClient {
    pub fn new(api: Arc<dyn SessionApi>, registry: SessionRegistry) -> Self {
        Self { api, registry }
    }

    /// Open the text stream of a session.
    ///
    /// Refuses with [`StreamError::AlreadySubscribed`] before any
    /// connection is opened when the session already has one.
    pub async fn subscribe(
        &self,
        session_id: &SessionId,
        kind: StreamKind,
    ) -> Result<Subscription, StreamError> {
        let Some(claim) = self.registry.claim_subscription(session_id) else {
            return Err(match self.registry.get(session_id) {
                None => StreamError::UnknownSession(session_id.clone()),
                Some(session) if session.status.is_terminal() => {
                    StreamError::SessionFinished(session_id.clone())
                }
                Some(_) => StreamError::AlreadySubscribed(session_id.clone()),
            });
        };

        debug!(%session_id, kind = kind.as_str(), "Opening text stream");
        let opened = tokio::select! {
            biased;
            () = claim.cancel.cancelled() => None,
            opened = self.api.open_stream(session_id, kind) => Some(opened),
        };

        let stream = match opened {
            None => {
                self.registry.release_subscription(session_id, claim.ticket);
                return Err(StreamError::Cancelled(session_id.clone()));
            }
            Some(Err(e)) => {
                if !e.is_clean_close() {
                    self.registry.fail(session_id, &e.to_string());
                }
                self.registry.release_subscription(session_id, claim.ticket);
                return Err(e.into());
            }
            Some(Ok(stream)) => stream,
        };

        let finished = CancellationToken::new();
        tokio::spawn(pump(
            stream,
            self.registry.clone(),
            session_id.clone(),
            claim.clone(),
            finished.clone(),
        ));

        Ok(Subscription {
            session_id: session_id.clone(),
            kind,
            claim,
            finished,
            registry: self.registry.clone(),
        })
    }
}

impl std::fmt::Debug for TextStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStreamClient")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Handle to a running text subscription.
///
/// Dropping the handle does not close the connection; call
/// [`Subscription::close`] (or register it in a teardown list).
#[derive(Debug)]
pub struct Subscription {
    session_id: SessionId,
    kind: StreamKind,
    claim: SubscriptionClaim,
    finished: CancellationToken,
    registry: SessionRegistry,
}

impl Subscription {
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Close the connection and free the session's subscription slot.
    ///
    /// The session record and its message text are kept.
    pub fn close(&self) {
        if !self.claim.cancel.is_cancelled() {
            trace!(session_id = %self.session_id, "Closing text subscription");
        }
        self.claim.cancel.cancel();
        self.registry
            .release_subscription(&self.session_id, self.claim.ticket);
    }

    /// Whether the pump task has stopped.
    pub fn is_closed(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait until the pump task has stopped.
    pub async fn closed(&self) {
        self.finished.cancelled().await;
    }

    /// A token cancelled once the pump task has stopped, for waiting after
    /// the handle moved into a teardown list.
    pub fn closed_signal(&self) -> CancellationToken {
        self.finished.clone()
    }
}

impl Disposable for Subscription {
    fn dispose(&mut self) {
        self.close();
    }

    fn label(&self) -> &'static str {
        "text-subscription"
    }
}

// ── Pump ────────────────────────────────────────────────────────────────

async fn pump(
    mut stream: FrameByteStream,
    registry: SessionRegistry,
    session_id: SessionId,
    claim: SubscriptionClaim,
    finished: CancellationToken,
) {
    let _finished = finished.drop_guard();
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            () = claim.cancel.cancelled() => {
                trace!(%session_id, "Text subscription cancelled");
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let flow = decoder
                    .push(&chunk)
                    .iter()
                    .try_for_each(|event| deliver(&registry, &session_id, event));
                if flow.is_break() {
                    break;
                }
            }
            Some(Err(e)) if e.is_clean_close() => {
                debug!(%session_id, error = %e, "Text stream closed cleanly");
                break;
            }
            Some(Err(e)) => {
                registry.fail(&session_id, &e.to_string());
                break;
            }
            None => {
                if let Some(event) = decoder.finish() {
                    let _ = deliver(&registry, &session_id, &event);
                }
                // A body that ends before a terminal frame is a dropped connection.
                let open = registry
                    .get(&session_id)
                    .is_some_and(|session| !session.status.is_terminal());
                if open && !claim.cancel.is_cancelled() {
                    registry.fail(&session_id, "stream ended before completion");
                } else {
                    debug!(%session_id, "Text stream ended");
                }
                break;
            }
        }
    }

    registry.release_subscription(&session_id, claim.ticket);
}

/// Apply one event. `Break` means the stream should stop.
fn deliver(
    registry: &SessionRegistry,
    session_id: &SessionId,
    event: &SseEvent,
) -> ControlFlow<()> {
    match parse_frame(event) {
        Ok(Some(frame)) => {
            let name = frame.event_name();
            let outcome = registry.apply_frame(session_id, frame);
            trace!(%session_id, event = name, ?outcome, "Frame applied");
            // A dropped frame means the session was fenced under us.
            let fenced = registry
                .get(session_id)
                .is_none_or(|session| session.status.is_terminal());
            if outcome.closes_stream() || fenced {
                return ControlFlow::Break(());
            }
        }
        Ok(None) => {}
        Err(e) if e.is_fatal() => {
            registry.fail(session_id, &e.to_string());
            return ControlFlow::Break(());
        }
        Err(e) => warn!(%session_id, error = %e, "Skipping malformed frame"),
    }
    ControlFlow::Continue(())
}
