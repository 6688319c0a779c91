//! Recording media backend for tests (feature `test-utils`).
//!
//! Every call into the pipeline is appended to a shared [`MediaLog`]. Appends
//! can complete synchronously or stay in flight until the test settles them,
//! which is how ordering and overlap are checked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::VoiceError;
use crate::media::{
    AppendProgress, AudioGraphNode, MediaBackend, MediaBuffer, MediaEvent, MediaSource,
    PlaybackElement, PlaybackResourceSet,
};

/// One observed pipeline call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    Open,
    Append(usize),
    Abort,
    EndOfStream,
    Play,
    Pause,
    Resume,
    ReleaseBuffer,
    ReleaseSource,
    DisconnectGraph,
    ReleaseElement,
}

#[derive(Debug, Default)]
struct MediaShared {
    calls: Vec<MediaCall>,
    append_in_flight: bool,
    overlapping_appends: usize,
    open_sets: usize,
    max_open_sets: usize,
}

/// Shared call log.
#[derive(Debug, Clone, Default)]
pub struct MediaLog {
    inner: Arc<Mutex<MediaShared>>,
}

impl MediaLog {
    fn lock(&self) -> MutexGuard<'_, MediaShared> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: MediaCall) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.lock().calls.clone()
    }

    /// Sizes of every append, in order.
    pub fn appended_sizes(&self) -> Vec<usize> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MediaCall::Append(size) => Some(*size),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &MediaCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Appends started while another was still in flight.
    pub fn overlapping_appends(&self) -> usize {
        self.lock().overlapping_appends
    }

    /// Most resource sets ever alive at the same time.
    pub fn max_open_sets(&self) -> usize {
        self.lock().max_open_sets
    }

    pub fn append_in_flight(&self) -> bool {
        self.lock().append_in_flight
    }

    /// Finish the in-flight append, returning the event to deliver.
    pub fn settle_append(&self) -> Option<MediaEvent> {
        let mut shared = self.lock();
        if !shared.append_in_flight {
            return None;
        }
        shared.append_in_flight = false;
        Some(MediaEvent::AppendComplete)
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }
}

/// Configurable fake [`MediaBackend`].
#[derive(Debug, Clone, Default)]
pub struct RecordingMedia {
    log: MediaLog,
    /// Appends stay in flight until [`MediaLog::settle_append`].
    pub deferred_appends: bool,
    /// `open` fails with `Unsupported`.
    pub unsupported: bool,
    /// `play` fails (autoplay refused).
    pub refuse_play: bool,
    /// Include an audio-graph node in each set.
    pub with_graph: bool,
}

impl RecordingMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose appends complete only when settled.
    pub fn deferred() -> Self {
        Self {
            deferred_appends: true,
            with_graph: true,
            ..Self::default()
        }
    }

    /// Backend without streaming media support.
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    /// Backend whose `play` is refused, as under an autoplay policy.
    pub fn refusing_play() -> Self {
        Self {
            refuse_play: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> MediaLog {
        self.log.clone()
    }
}

impl MediaBackend for RecordingMedia {
    fn open(&mut self) -> Result<PlaybackResourceSet, VoiceError> {
        if self.unsupported {
            return Err(VoiceError::Unsupported("recording backend".into()));
        }
        {
            let mut shared = self.log.lock();
            shared.calls.push(MediaCall::Open);
            shared.open_sets += 1;
            shared.max_open_sets = shared.max_open_sets.max(shared.open_sets);
        }
        let part = |deferred| Part {
            log: self.log.clone(),
            deferred,
            refuse_play: self.refuse_play,
        };
        Ok(PlaybackResourceSet::new(
            Box::new(part(self.deferred_appends)),
            Box::new(part(false)),
            self.with_graph
                .then(|| Box::new(part(false)) as Box<dyn AudioGraphNode>),
            Box::new(part(false)),
        ))
    }
}

struct Part {
    log: MediaLog,
    deferred: bool,
    refuse_play: bool,
}

impl MediaBuffer for Part {
    fn append(&mut self, data: Bytes) -> Result<AppendProgress, VoiceError> {
        let mut shared = self.log.lock();
        if shared.append_in_flight {
            shared.overlapping_appends += 1;
        }
        shared.calls.push(MediaCall::Append(data.len()));
        if self.deferred {
            shared.append_in_flight = true;
            Ok(AppendProgress::InFlight)
        } else {
            Ok(AppendProgress::Done)
        }
    }

    fn abort(&mut self) {
        let mut shared = self.log.lock();
        shared.append_in_flight = false;
        shared.calls.push(MediaCall::Abort);
    }

    fn release(&mut self) {
        let mut shared = self.log.lock();
        shared.append_in_flight = false;
        shared.calls.push(MediaCall::ReleaseBuffer);
    }
}

impl MediaSource for Part {
    fn end_of_stream(&mut self) -> Result<(), VoiceError> {
        self.log.record(MediaCall::EndOfStream);
        Ok(())
    }

    fn release(&mut self) {
        self.log.record(MediaCall::ReleaseSource);
    }
}

impl AudioGraphNode for Part {
    fn disconnect(&mut self) {
        self.log.record(MediaCall::DisconnectGraph);
    }
}

impl PlaybackElement for Part {
    fn play(&mut self) -> Result<(), VoiceError> {
        self.log.record(MediaCall::Play);
        if self.refuse_play {
            return Err(VoiceError::Playback("autoplay refused".into()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.log.record(MediaCall::Pause);
    }

    fn resume(&mut self) -> Result<(), VoiceError> {
        self.log.record(MediaCall::Resume);
        Ok(())
    }

    fn release(&mut self) {
        let mut shared = self.log.lock();
        shared.open_sets = shared.open_sets.saturating_sub(1);
        shared.calls.push(MediaCall::ReleaseElement);
    }
}
