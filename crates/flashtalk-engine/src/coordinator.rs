//! `InterruptCoordinator`: the single answer to "should channel X keep
//! accepting frames for session Y".
//!
//! Every attach (text subscription, audio attachment) is registered here as
//! a [`Disposable`] under its session. Interrupting a session asks the
//! backend to stop, fences the session in the registry, and disposes its
//! handles. Frames that arrive later are dropped by the registry's
//! terminal-status check or by [`InterruptCoordinator::should_accept`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flashtalk_core::{
    Disposable, SessionApi, SessionId, SessionRegistry, SessionStatus, TeardownList,
};
use flashtalk_stream::Subscription;
use flashtalk_voice::{AudioStreamPlayer, PlaybackPhase, PlaybackState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The player shared by the engine, the coordinator, and audio attachments.
pub type SharedPlayer = Arc<Mutex<AudioStreamPlayer>>;

/// Lock the shared player, recovering from a poisoned lock.
pub fn lock_player(player: &SharedPlayer) -> MutexGuard<'_, AudioStreamPlayer> {
    player.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inbound channel a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Text,
    Audio,
}

// ── Decision table ─────────────────────────────────────────────────

/// What to do with in-flight audio before a new send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendPreparation {
    /// Nothing is playing.
    None,
    /// Audio is still being synthesised: stop the backend too.
    RemoteInterrupt(SessionId),
    /// Synthesis already finished: only local playback needs clearing.
    LocalClear,
}

/// Apply the new-send decision table to the current playback state.
pub fn prepare_for_send(state: &PlaybackState) -> SendPreparation {
    match state.phase {
        PlaybackPhase::Connecting | PlaybackPhase::Buffering | PlaybackPhase::Playing
            if !state.synthesis_completed =>
        {
            state
                .session_id
                .clone()
                .map_or(SendPreparation::LocalClear, SendPreparation::RemoteInterrupt)
        }
        PlaybackPhase::Connecting
        | PlaybackPhase::Buffering
        | PlaybackPhase::Playing
        | PlaybackPhase::Paused => SendPreparation::LocalClear,
        _ => SendPreparation::None,
    }
}

// ── Audio attachment ───────────────────────────────────────────────

/// Teardown handle binding the shared player to one session.
///
/// Disposing interrupts the player only if it is still bound to this
/// session, so a stale attachment never stops a newer stream.
pub struct AudioAttachment {
    session_id: SessionId,
    player: SharedPlayer,
    disposed: bool,
}

impl AudioAttachment {
    pub const fn new(session_id: SessionId, player: SharedPlayer) -> Self {
        Self {
            session_id,
            player,
            disposed: false,
        }
    }
}

impl Disposable for AudioAttachment {
    fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        let mut player = lock_player(&self.player);
        if player.state().is_streaming_for(&self.session_id) {
            player.interrupt();
        }
    }

    fn label(&self) -> &'static str {
        "audio-attachment"
    }
}

// ── Coordinator ────────────────────────────────────────────────────

#[derive(Default)]
struct SessionHandles {
    teardown: TeardownList,
    text_closed: Option<CancellationToken>,
}

/// Coordinates interruption across the text and audio channels.
pub struct InterruptCoordinator {
    api: Arc<dyn SessionApi>,
    registry: SessionRegistry,
    player: SharedPlayer,
    handles: Mutex<HashMap<SessionId, SessionHandles>>,
}

impl InterruptCoordinator {
    pub fn new(api: Arc<dyn SessionApi>, registry: SessionRegistry, player: SharedPlayer) -> Self {
        Self {
            api,
            registry,
            player,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandles>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a teardown handle under its session.
    pub fn register(&self, session_id: &SessionId, item: Box<dyn Disposable>) {
        self.handles()
            .entry(session_id.clone())
            .or_default()
            .teardown
            .push(item);
    }

    /// Register a text subscription, remembering its close signal.
    pub fn register_text(&self, subscription: Subscription) {
        let session_id = subscription.session_id().clone();
        let closed = subscription.closed_signal();
        let mut handles = self.handles();
        let entry = handles.entry(session_id).or_default();
        entry.text_closed = Some(closed);
        entry.teardown.push(Box::new(subscription));
    }

    /// Token cancelled once the session's text subscription has stopped.
    pub fn text_closed(&self, session_id: &SessionId) -> Option<CancellationToken> {
        self.handles()
            .get(session_id)
            .and_then(|entry| entry.text_closed.clone())
    }

    /// Number of live teardown handles for a session.
    pub fn attached(&self, session_id: &SessionId) -> usize {
        self.handles()
            .get(session_id)
            .map_or(0, |entry| entry.teardown.len())
    }

    /// Whether a frame on `channel` for `session_id` should still be applied.
    pub fn should_accept(&self, channel: Channel, session_id: &SessionId) -> bool {
        match channel {
            Channel::Text => self
                .registry
                .get(session_id)
                .is_some_and(|session| !session.status.is_terminal()),
            Channel::Audio => {
                let state = lock_player(&self.player).state();
                self.accepts_audio(&state, session_id)
            }
        }
    }

    /// Audio acceptance against an already-read playback state.
    ///
    /// Callers holding the player lock use this instead of
    /// [`should_accept`](Self::should_accept).
    pub fn accepts_audio(&self, state: &PlaybackState, session_id: &SessionId) -> bool {
        let session_ok = self.registry.get(session_id).is_some_and(|session| {
            !matches!(
                session.status,
                SessionStatus::Interrupted | SessionStatus::Error
            )
        });
        session_ok && state.is_streaming_for(session_id)
    }

    /// Stop a session on both channels.
    ///
    /// The remote call is best-effort: its failure is logged and local
    /// cleanup proceeds regardless. Returns `false` if the session was
    /// unknown or already terminal locally.
    pub async fn interrupt(&self, session_id: &SessionId) -> bool {
        if let Err(e) = self.api.interrupt(session_id).await {
            warn!(%session_id, error = %e, "Remote interrupt failed, cleaning up locally");
        }

        let fenced = self.registry.mark_interrupted(session_id);
        self.dispose_session(session_id);
        debug!(%session_id, fenced, "Session interrupted");
        fenced
    }

    /// Dispose every handle registered for a session, without a remote call.
    pub fn dispose_session(&self, session_id: &SessionId) {
        let removed = self.handles().remove(session_id);
        // Dispose outside the map lock; audio attachments take the player lock.
        if let Some(mut entry) = removed {
            entry.teardown.dispose_all();
        }
    }

    /// Dispose every handle of every session (view teardown).
    pub fn teardown_all(&self) {
        let drained: Vec<_> = self.handles().drain().collect();
        for (session_id, mut entry) in drained {
            debug!(%session_id, handles = entry.teardown.len(), "Tearing down session");
            entry.teardown.dispose_all();
        }
    }
}

impl std::fmt::Debug for InterruptCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptCoordinator")
            .field("sessions", &self.handles().len())
            .finish_non_exhaustive()
    }
}
