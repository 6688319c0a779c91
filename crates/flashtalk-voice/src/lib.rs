#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod emotion;
pub mod error;
pub mod media;
pub mod player;
pub mod queue;
pub mod signal;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use emotion::{EmotionSync, Expression};
pub use error::VoiceError;
pub use media::{
    AppendProgress, AudioGraphNode, MediaBackend, MediaBuffer, MediaEvent, MediaSource,
    PlaybackElement, PlaybackResourceSet, UnsupportedMediaBackend,
};
pub use player::{AudioStreamPlayer, PlaybackPhase, PlaybackState};
pub use queue::AudioFrameQueue;
pub use signal::{ControlMessage, VoiceSignal};
