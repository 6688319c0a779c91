//! Media pipeline ports and the owned playback resource set.
//!
//! A streaming media pipeline is four cooperating handles: a buffer that
//! accepts encoded bytes, the source that owns it (and the object handle the
//! element plays from), an optional audio-graph node used for analysis, and
//! the playback element itself. [`PlaybackResourceSet`] owns all four and
//! tears them down in one ordered [`release`](PlaybackResourceSet::release).

use bytes::Bytes;

use crate::error::VoiceError;

// ── Events ─────────────────────────────────────────────────────────

/// Asynchronous notifications from the media pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The in-flight append finished.
    AppendComplete,
    /// Playback reached the end of the stream.
    Ended,
    /// The pipeline failed.
    Failed(String),
}

/// Result of starting an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendProgress {
    /// The bytes were consumed synchronously.
    Done,
    /// Completion will arrive as [`MediaEvent::AppendComplete`].
    InFlight,
}

// ── Ports ──────────────────────────────────────────────────────────

/// Opens streaming pipelines.
pub trait MediaBackend: Send {
    /// Build a fresh resource set.
    ///
    /// Returns [`VoiceError::Unsupported`] when the platform cannot stream.
    fn open(&mut self) -> Result<PlaybackResourceSet, VoiceError>;
}

/// Append-only buffer of encoded audio.
pub trait MediaBuffer: Send {
    fn append(&mut self, data: Bytes) -> Result<AppendProgress, VoiceError>;

    /// Abort an in-flight append.
    fn abort(&mut self);

    /// Detach the buffer from its source.
    fn release(&mut self);
}

/// Owner of the buffer and of the object handle the element plays.
pub trait MediaSource: Send {
    /// Signal that no more bytes will be appended.
    fn end_of_stream(&mut self) -> Result<(), VoiceError>;

    /// Revoke the object handle.
    fn release(&mut self);
}

/// Optional analysis node between the element and the output.
pub trait AudioGraphNode: Send {
    fn disconnect(&mut self);
}

/// The element that actually plays sound.
pub trait PlaybackElement: Send {
    fn play(&mut self) -> Result<(), VoiceError>;
    fn pause(&mut self);
    fn resume(&mut self) -> Result<(), VoiceError>;

    /// Stop and detach from the source.
    fn release(&mut self);
}

// ── Resource set ───────────────────────────────────────────────────

/// One owned streaming pipeline.
///
/// Release order is buffer, source, graph node, element. Release happens
/// exactly once, either explicitly or on drop.
pub struct PlaybackResourceSet {
    buffer: Box<dyn MediaBuffer>,
    source: Box<dyn MediaSource>,
    graph: Option<Box<dyn AudioGraphNode>>,
    element: Box<dyn PlaybackElement>,
    released: bool,
}

impl PlaybackResourceSet {
    pub fn new(
        buffer: Box<dyn MediaBuffer>,
        source: Box<dyn MediaSource>,
        graph: Option<Box<dyn AudioGraphNode>>,
        element: Box<dyn PlaybackElement>,
    ) -> Self {
        Self {
            buffer,
            source,
            graph,
            element,
            released: false,
        }
    }

    pub fn buffer(&mut self) -> &mut dyn MediaBuffer {
        self.buffer.as_mut()
    }

    pub fn source(&mut self) -> &mut dyn MediaSource {
        self.source.as_mut()
    }

    pub fn element(&mut self) -> &mut dyn PlaybackElement {
        self.element.as_mut()
    }

    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Tear every handle down in order. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.buffer.release();
        self.source.release();
        if let Some(graph) = self.graph.as_mut() {
            graph.disconnect();
        }
        self.element.release();
        tracing::trace!("Playback resources released");
    }
}

impl Drop for PlaybackResourceSet {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PlaybackResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackResourceSet")
            .field("has_graph", &self.graph.is_some())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

// ── Unsupported backend ────────────────────────────────────────────

/// Backend for hosts without a streaming media pipeline.
///
/// Every `open` fails with [`VoiceError::Unsupported`], so sessions fall
/// back to text only.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedMediaBackend {
    reason: Option<String>,
}

impl UnsupportedMediaBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl MediaBackend for UnsupportedMediaBackend {
    fn open(&mut self) -> Result<PlaybackResourceSet, VoiceError> {
        Err(VoiceError::Unsupported(
            self.reason
                .clone()
                .unwrap_or_else(|| "no streaming media pipeline available".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Part(Log, &'static str);

    impl MediaBuffer for Part {
        fn append(&mut self, _data: Bytes) -> Result<AppendProgress, VoiceError> {
            Ok(AppendProgress::Done)
        }
        fn abort(&mut self) {}
        fn release(&mut self) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    impl MediaSource for Part {
        fn end_of_stream(&mut self) -> Result<(), VoiceError> {
            Ok(())
        }
        fn release(&mut self) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    impl AudioGraphNode for Part {
        fn disconnect(&mut self) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    impl PlaybackElement for Part {
        fn play(&mut self) -> Result<(), VoiceError> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) -> Result<(), VoiceError> {
            Ok(())
        }
        fn release(&mut self) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    fn set(log: &Log, graph: bool) -> PlaybackResourceSet {
        PlaybackResourceSet::new(
            Box::new(Part(log.clone(), "buffer")),
            Box::new(Part(log.clone(), "source")),
            graph.then(|| Box::new(Part(log.clone(), "graph")) as Box<dyn AudioGraphNode>),
            Box::new(Part(log.clone(), "element")),
        )
    }

    #[test]
    fn release_is_ordered_and_once() {
        let log = Log::default();
        let mut resources = set(&log, true);
        resources.release();
        resources.release();
        drop(resources);
        assert_eq!(*log.lock().unwrap(), ["buffer", "source", "graph", "element"]);
    }

    #[test]
    fn drop_releases_without_graph() {
        let log = Log::default();
        drop(set(&log, false));
        assert_eq!(*log.lock().unwrap(), ["buffer", "source", "element"]);
    }

    #[test]
    fn unsupported_backend_fails_fast() {
        let err = UnsupportedMediaBackend::default().open().unwrap_err();
        assert!(err.is_unsupported());
    }
}
