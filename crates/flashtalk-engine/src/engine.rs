//! `ConversationEngine`: the upward facade a flashcard view talks to.
//!
//! # Design Rules
//!
//! - The engine owns no message state: every mutation goes through the
//!   [`SessionRegistry`].
//! - The player lock is never held across an `.await`. Lock order is
//!   player, then registry.
//! - Socket and media inputs are synchronous calls; only sending,
//!   interrupting, and history recovery suspend.

use std::sync::{Arc, Mutex};

use flashtalk_core::{
    AttachOutcome, ContextMode, EngineSettings, InitSessionRequest, Message, MessageRole,
    SessionApi, SessionContext, SessionId, SessionRegistry, StreamKind,
};
use flashtalk_stream::TextStreamClient;
use flashtalk_voice::{
    AudioStreamPlayer, ControlMessage, EmotionSync, Expression, MediaBackend, MediaEvent,
    PlaybackPhase, PlaybackState, VoiceSignal,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::coordinator::{
    AudioAttachment, Channel, InterruptCoordinator, SendPreparation, SharedPlayer, lock_player,
    prepare_for_send,
};
use crate::error::EngineError;

/// Conversation engine for one flashcard view.
pub struct ConversationEngine {
    registry: SessionRegistry,
    api: Arc<dyn SessionApi>,
    text: TextStreamClient,
    player: SharedPlayer,
    emotion: EmotionSync,
    coordinator: InterruptCoordinator,
    voice_enabled: bool,
}

impl ConversationEngine {
    /// Build an engine for the card `card_context_id`.
    pub fn new(
        card_context_id: impl Into<String>,
        api: Arc<dyn SessionApi>,
        media: Box<dyn MediaBackend>,
        voice_enabled: bool,
    ) -> Self {
        let registry = SessionRegistry::new(card_context_id);
        let player: SharedPlayer = Arc::new(Mutex::new(AudioStreamPlayer::new(media)));
        let text = TextStreamClient::new(api.clone(), registry.clone());
        let coordinator = InterruptCoordinator::new(api.clone(), registry.clone(), player.clone());
        Self {
            registry,
            api,
            text,
            player,
            emotion: EmotionSync::new(),
            coordinator,
            voice_enabled,
        }
    }

    /// Build an engine honouring the voice setting.
    pub fn from_settings(
        card_context_id: impl Into<String>,
        api: Arc<dyn SessionApi>,
        media: Box<dyn MediaBackend>,
        settings: &EngineSettings,
    ) -> Self {
        Self::new(
            card_context_id,
            api,
            media,
            settings.effective_voice_enabled(),
        )
    }

    // ── Observables ────────────────────────────────────────────────

    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.registry.subscribe_messages()
    }

    pub fn playback(&self) -> watch::Receiver<PlaybackState> {
        lock_player(&self.player).subscribe()
    }

    pub fn expression(&self) -> watch::Receiver<Expression> {
        self.emotion.subscribe()
    }

    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub const fn coordinator(&self) -> &InterruptCoordinator {
        &self.coordinator
    }

    pub fn playback_state(&self) -> PlaybackState {
        lock_player(&self.player).state()
    }

    /// Token cancelled once the session's text stream has stopped.
    pub fn text_closed(&self, session_id: &SessionId) -> Option<CancellationToken> {
        self.coordinator.text_closed(session_id)
    }

    // ── Sending ────────────────────────────────────────────────────

    /// Ask about the card (or a chunk of it) and start streaming the answer.
    ///
    /// Audio still playing from a previous answer is stopped first. If
    /// synthesis of that answer is still running, the backend is asked to
    /// stop it as well.
    pub async fn send(
        &self,
        prompt: &str,
        context_mode: ContextMode,
    ) -> Result<SessionId, EngineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::EmptyPrompt);
        }

        let preparation = prepare_for_send(&self.playback_state());
        match preparation {
            SendPreparation::None => {}
            SendPreparation::RemoteInterrupt(previous) => {
                debug!(session_id = %previous, "Interrupting in-flight synthesis before send");
                self.coordinator.interrupt(&previous).await;
                self.emotion.reset();
            }
            SendPreparation::LocalClear => {
                lock_player(&self.player).interrupt();
                self.emotion.reset();
            }
        }

        self.registry.push_user_message(prompt);
        let message_id = self.registry.push_pending_assistant();

        let card_context_id = self.registry.card_context_id();
        let chunk_id = context_mode.chunk_id().map(str::to_string);
        let request = InitSessionRequest {
            context_id: card_context_id.clone(),
            chunk_id: chunk_id.clone(),
            prompt: prompt.to_string(),
            context_mode,
            voice: self.voice_enabled,
        };

        let session_id = match self.api.init_session(request).await {
            Ok(response) => response.session_id,
            Err(e) => {
                warn!(%message_id, error = %e, "Session init failed");
                self.registry.fail_message(message_id);
                return Err(EngineError::Init(e));
            }
        };

        self.registry.create_session(
            session_id.clone(),
            SessionContext::new(card_context_id, chunk_id),
            message_id,
            self.voice_enabled,
        );

        if self.voice_enabled {
            self.attach_audio(&session_id);
        }

        let subscription = match self.text.subscribe(&session_id, StreamKind::Live).await {
            Ok(subscription) => subscription,
            Err(e) => {
                // Release the audio attachment along with the failed stream.
                self.coordinator.dispose_session(&session_id);
                return Err(e.into());
            }
        };
        self.coordinator.register_text(subscription);

        info!(%session_id, %message_id, voice = self.voice_enabled, "Session started");
        Ok(session_id)
    }

    fn attach_audio(&self, session_id: &SessionId) {
        let connected = lock_player(&self.player).connect(session_id.clone());
        match connected {
            Ok(()) => self.coordinator.register(
                session_id,
                Box::new(AudioAttachment::new(session_id.clone(), self.player.clone())),
            ),
            Err(e) => {
                // Text continues without audio.
                warn!(%session_id, error = %e, "Audio disabled for session");
                self.registry.set_has_audio(session_id, false);
            }
        }
    }

    // ── User controls ──────────────────────────────────────────────

    /// Stop the active generation.
    ///
    /// Targets the session whose audio is still streaming, otherwise the
    /// most recent live session. Returns the interrupted session.
    pub async fn interrupt_active(&self) -> Option<SessionId> {
        let state = self.playback_state();
        let target = state
            .session_id
            .filter(|_| state.phase.is_connected())
            .or_else(|| self.registry.active_session())?;

        self.coordinator.interrupt(&target).await;
        self.emotion.reset();
        Some(target)
    }

    /// Pause when playing, resume when paused. Returns the resulting phase.
    pub fn toggle_pause_resume(&self) -> PlaybackPhase {
        let mut player = lock_player(&self.player);
        match player.phase() {
            PlaybackPhase::Playing => {
                player.pause();
            }
            PlaybackPhase::Paused => {
                player.resume();
            }
            _ => {}
        }
        player.phase()
    }

    // ── History ────────────────────────────────────────────────────

    /// Load persisted history and re-attach every generation still open.
    ///
    /// Safe to call on every mount: sessions whose stream is still running
    /// are skipped, so no duplicate stream is ever opened. Tracked sessions
    /// left without a stream by [`teardown`](Self::teardown) are reopened
    /// through the recovery stream. Returns the sessions that were
    /// (re)attached.
    pub async fn recover_history(&self, messages: Vec<Message>) -> Vec<SessionId> {
        let open: Vec<Message> = messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant && m.has_open_session())
            .cloned()
            .collect();
        self.registry.replace_history(messages);

        let mut attached = Vec::new();
        for message in open {
            let Some(session_id) = message.session_id.clone() else {
                continue;
            };
            let outcome = self.registry.attach_existing(session_id.clone(), message);
            if outcome == AttachOutcome::AlreadyAttached && !self.is_detached(&session_id) {
                trace!(%session_id, "Session already attached");
                continue;
            }
            match self.text.subscribe(&session_id, StreamKind::Recovery).await {
                Ok(subscription) => {
                    self.coordinator.register_text(subscription);
                    attached.push(session_id);
                }
                Err(e) => warn!(%session_id, error = %e, "Could not recover session"),
            }
        }
        debug!(recovered = attached.len(), "History recovered");
        attached
    }

    /// Tracked, still live, and without a running stream.
    fn is_detached(&self, session_id: &SessionId) -> bool {
        self.registry
            .get(session_id)
            .is_some_and(|session| !session.status.is_terminal())
            && !self.registry.is_processing(session_id)
    }

    // ── Socket and media inputs ────────────────────────────────────

    /// Apply one message from the socket transport.
    pub fn handle_voice_signal(&self, signal: VoiceSignal) {
        match signal {
            VoiceSignal::AudioFrame(bytes) => {
                let mut player = lock_player(&self.player);
                let state = player.state();
                match state.session_id.as_ref() {
                    Some(session_id) if self.coordinator.accepts_audio(&state, session_id) => {
                        player.push_frame(bytes);
                    }
                    _ => trace!(bytes = bytes.len(), phase = %state.phase, "Dropping audio frame"),
                }
            }
            VoiceSignal::Control(message) => self.handle_control(message),
        }
    }

    fn handle_control(&self, message: ControlMessage) {
        match message {
            ControlMessage::SynthesisStarted { session_id } => {
                debug!(%session_id, "Synthesis started");
            }
            ControlMessage::SynthesisFinished { session_id } => {
                let mut player = lock_player(&self.player);
                if player.state().session_id.as_ref() == Some(&session_id) {
                    player.mark_synthesis_completed();
                }
            }
            ControlMessage::SynthesisFailed { session_id, reason } => {
                let reason = reason.unwrap_or_else(|| "unknown".to_string());
                {
                    let mut player = lock_player(&self.player);
                    if player.state().session_id.as_ref() == Some(&session_id) {
                        player.fail_synthesis(&reason);
                    }
                }
                self.registry.set_has_audio(&session_id, false);
                warn!(%session_id, %reason, "Synthesis failed, continuing with text only");
            }
            ControlMessage::Interrupted { session_id } => {
                // Server-side stop: fence locally without calling back.
                self.registry.mark_interrupted(&session_id);
                self.coordinator.dispose_session(&session_id);
                self.emotion.reset();
            }
            ControlMessage::Emotion { session_id, text } => {
                if let Some(ref session_id) = session_id
                    && !self.coordinator.should_accept(Channel::Text, session_id)
                    && !self.coordinator.should_accept(Channel::Audio, session_id)
                {
                    trace!(%session_id, "Dropping emotion for finished session");
                    return;
                }
                self.emotion.on_emotion_token(&text);
            }
        }
    }

    /// Apply one media pipeline notification.
    pub fn handle_media_event(&self, event: MediaEvent) {
        lock_player(&self.player).handle_media_event(event);
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// View teardown: close every stream and audio attachment locally.
    ///
    /// No remote call is made; generations keep running server-side and can
    /// be recovered on the next mount.
    pub fn teardown(&self) {
        self.coordinator.teardown_all();
        self.registry.detach_all();
        self.emotion.reset();
        debug!("Conversation view torn down");
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("registry", &self.registry)
            .field("voice_enabled", &self.voice_enabled)
            .finish_non_exhaustive()
    }
}
