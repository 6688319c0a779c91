#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod coordinator;
mod engine;
mod error;

pub use coordinator::{
    AudioAttachment, Channel, InterruptCoordinator, SendPreparation, SharedPlayer,
    prepare_for_send,
};
pub use engine::ConversationEngine;
pub use error::EngineError;

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
