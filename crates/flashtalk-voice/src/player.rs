//! `AudioStreamPlayer`: gapless playback of an incrementally delivered
//! audio stream.
//!
//! The player is driven synchronously: socket frames, media events, and
//! user actions each call one method, and every method leaves the player in
//! a consistent state before returning. Callers share it behind a
//! `std::sync::Mutex` and never hold the lock across an `.await`.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──first frame──▶ Buffering
//!                                                   │ first append done + play ok
//!                                                   ▼
//!            Paused ◀──pause (synthesis done)── Playing ──Ended──▶ Completed
//!              └────────────resume─────────────────▶
//!
//! any state ──interrupt──▶ Interrupted      any failure ──▶ Error
//! ```

use bytes::Bytes;
use flashtalk_core::SessionId;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::VoiceError;
use crate::media::{AppendProgress, MediaBackend, MediaEvent, PlaybackResourceSet};
use crate::queue::AudioFrameQueue;

// ── State ──────────────────────────────────────────────────────────

/// Playback phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Connecting,
    Buffering,
    Playing,
    Paused,
    Completed,
    Interrupted,
    Error,
}

impl PlaybackPhase {
    /// Whether a resource set is held and frames are accepted.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Buffering | Self::Playing | Self::Paused
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Buffering => "buffering",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot of the player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub synthesis_completed: bool,
    pub session_id: Option<SessionId>,
    pub bytes_received: u64,
    pub bytes_appended: u64,
}

impl PlaybackState {
    /// Whether audio for `session_id` is still arriving or playing.
    #[must_use]
    pub fn is_streaming_for(&self, session_id: &SessionId) -> bool {
        self.phase.is_connected() && self.session_id.as_ref() == Some(session_id)
    }
}

// ── Player ─────────────────────────────────────────────────────────

/// Streaming audio player for one view.
pub struct AudioStreamPlayer {
    backend: Box<dyn MediaBackend>,
    resources: Option<PlaybackResourceSet>,
    queue: AudioFrameQueue,
    /// Size of the append in flight, if any.
    in_flight: Option<usize>,
    end_of_stream_sent: bool,
    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
}

impl AudioStreamPlayer {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());
        Self {
            backend,
            resources: None,
            queue: AudioFrameQueue::new(),
            in_flight: None,
            end_of_stream_sent: false,
            state: PlaybackState::default(),
            state_tx,
        }
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.clone()
    }

    pub const fn phase(&self) -> PlaybackPhase {
        self.state.phase
    }

    /// Bytes waiting for the next append.
    pub const fn queued_bytes(&self) -> usize {
        self.queue.total_bytes()
    }

    pub const fn append_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Bind to a session and open a fresh pipeline.
    ///
    /// Any previous resource set is released first. On failure the phase
    /// becomes `Error` and the caller should fall back to text only.
    pub fn connect(&mut self, session_id: SessionId) -> Result<(), VoiceError> {
        self.release_resources();
        self.reset_stream();
        self.state.session_id = Some(session_id.clone());

        let result = match self.backend.open() {
            Ok(resources) => {
                self.resources = Some(resources);
                self.state.phase = PlaybackPhase::Connecting;
                debug!(%session_id, "Audio pipeline connected");
                Ok(())
            }
            Err(e) => {
                self.state.phase = PlaybackPhase::Error;
                warn!(%session_id, error = %e, "Audio pipeline unavailable");
                Err(e)
            }
        };
        self.publish();
        result
    }

    /// Queue one audio frame and start an append if none is in flight.
    ///
    /// Frames are dropped while no pipeline is connected.
    pub fn push_frame(&mut self, frame: Bytes) {
        if !self.state.phase.is_connected() {
            trace!(phase = %self.state.phase, bytes = frame.len(), "Dropping audio frame");
            return;
        }
        self.state.bytes_received += frame.len() as u64;
        self.queue.push(frame);
        if self.state.phase == PlaybackPhase::Connecting {
            self.state.phase = PlaybackPhase::Buffering;
        }
        self.pump();
        self.publish();
    }

    /// The server finished synthesising; end the stream once drained.
    pub fn mark_synthesis_completed(&mut self) {
        if !self.state.phase.is_connected() {
            return;
        }
        self.state.synthesis_completed = true;
        self.maybe_end_stream();
        self.publish();
    }

    /// Feed an asynchronous pipeline notification.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::AppendComplete => {
                let Some(appended) = self.in_flight.take() else {
                    trace!("Ignoring stale append completion");
                    return;
                };
                self.append_done(appended);
                self.pump();
            }
            MediaEvent::Ended => {
                if !self.state.phase.is_connected() {
                    return;
                }
                self.release_resources();
                self.queue.clear();
                self.state.phase = PlaybackPhase::Completed;
                debug!(bytes = self.state.bytes_appended, "Audio playback completed");
            }
            MediaEvent::Failed(reason) => {
                if !self.state.phase.is_connected() {
                    return;
                }
                self.fail(&VoiceError::Media(reason));
            }
        }
        self.publish();
    }

    /// Retry starting playback (e.g. after an autoplay refusal).
    pub fn play(&mut self) -> bool {
        if self.state.phase != PlaybackPhase::Buffering || self.state.bytes_appended == 0 {
            return false;
        }
        self.start_playback();
        self.publish();
        self.state.phase == PlaybackPhase::Playing
    }

    /// Pause playback. Only accepted once synthesis has completed.
    pub fn pause(&mut self) -> bool {
        if self.state.phase != PlaybackPhase::Playing || !self.state.synthesis_completed {
            debug!(
                phase = %self.state.phase,
                synthesis_completed = self.state.synthesis_completed,
                "Pause rejected"
            );
            return false;
        }
        if let Some(resources) = self.resources.as_mut() {
            resources.element().pause();
        }
        self.state.phase = PlaybackPhase::Paused;
        self.publish();
        true
    }

    /// Resume paused playback. No-op unless paused.
    pub fn resume(&mut self) -> bool {
        if self.state.phase != PlaybackPhase::Paused {
            return false;
        }
        let resumed = self
            .resources
            .as_mut()
            .map_or(Ok(()), |resources| resources.element().resume());
        match resumed {
            Ok(()) => self.state.phase = PlaybackPhase::Playing,
            Err(e) => self.fail(&e),
        }
        self.publish();
        self.state.phase == PlaybackPhase::Playing
    }

    /// Stop everything now, from any state.
    ///
    /// Aborts a pending append, releases the resource set, and resets the
    /// queue and byte counters. Frames pushed afterwards are dropped until
    /// the next `connect`.
    pub fn interrupt(&mut self) {
        if let Some(resources) = self.resources.as_mut()
            && self.in_flight.is_some()
        {
            resources.buffer().abort();
        }
        self.release_resources();
        self.reset_stream();
        self.state.phase = PlaybackPhase::Interrupted;
        debug!(session_id = ?self.state.session_id, "Audio interrupted");
        self.publish();
    }

    /// The server gave up synthesising; drop the pipeline.
    pub fn fail_synthesis(&mut self, reason: &str) {
        if !self.state.phase.is_connected() {
            return;
        }
        self.fail(&VoiceError::Media(format!("synthesis failed: {reason}")));
        self.publish();
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Append everything queued, one unit at a time, never two at once.
    fn pump(&mut self) {
        while self.in_flight.is_none() && self.state.phase.is_connected() {
            let Some(data) = self.queue.drain_all() else {
                break;
            };
            let Some(resources) = self.resources.as_mut() else {
                break;
            };
            let size = data.len();
            match resources.buffer().append(data) {
                Ok(AppendProgress::Done) => self.append_done(size),
                Ok(AppendProgress::InFlight) => {
                    trace!(bytes = size, "Append in flight");
                    self.in_flight = Some(size);
                }
                Err(e) => {
                    self.fail(&e);
                    return;
                }
            }
        }
        self.maybe_end_stream();
    }

    fn append_done(&mut self, size: usize) {
        self.state.bytes_appended += size as u64;
        trace!(bytes = size, total = self.state.bytes_appended, "Append done");
        if self.state.phase == PlaybackPhase::Buffering {
            self.start_playback();
        }
    }

    fn start_playback(&mut self) {
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        match resources.element().play() {
            Ok(()) => {
                self.state.phase = PlaybackPhase::Playing;
                debug!(session_id = ?self.state.session_id, "Audio playback started");
            }
            // Stay buffering; `play` can retry.
            Err(e) => warn!(error = %e, "Playback did not start"),
        }
    }

    fn maybe_end_stream(&mut self) {
        if !self.state.synthesis_completed
            || self.end_of_stream_sent
            || self.in_flight.is_some()
            || !self.queue.is_empty()
        {
            return;
        }
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        self.end_of_stream_sent = true;
        if let Err(e) = resources.source().end_of_stream() {
            self.fail(&e);
        } else {
            debug!(bytes = self.state.bytes_appended, "Audio end of stream signalled");
        }
    }

    fn fail(&mut self, error: &VoiceError) {
        warn!(session_id = ?self.state.session_id, %error, "Audio pipeline failed");
        self.release_resources();
        self.queue.clear();
        self.in_flight = None;
        self.state.phase = PlaybackPhase::Error;
    }

    fn release_resources(&mut self) {
        if let Some(mut resources) = self.resources.take() {
            resources.release();
        }
    }

    fn reset_stream(&mut self) {
        self.queue.clear();
        self.in_flight = None;
        self.end_of_stream_sent = false;
        self.state.synthesis_completed = false;
        self.state.bytes_received = 0;
        self.state.bytes_appended = 0;
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                current.clone_from(&self.state);
                true
            }
        });
    }
}

impl Drop for AudioStreamPlayer {
    fn drop(&mut self) {
        self.release_resources();
    }
}

impl std::fmt::Debug for AudioStreamPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStreamPlayer")
            .field("state", &self.state)
            .field("queued_bytes", &self.queue.total_bytes())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
