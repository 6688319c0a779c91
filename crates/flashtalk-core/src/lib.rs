#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod domain;
pub mod ports;
pub mod services;
pub mod settings;

#[cfg(feature = "test-utils")]
pub mod testing;

// Re-export commonly used types for convenience
pub use domain::{
    ContextMode, Conversation, FrameOutcome, Message, MessageId, MessageRole, Session,
    SessionContext, SessionId, SessionStatus, TextFrame,
};
pub use ports::{
    Disposable, FrameByteStream, InitSessionRequest, InitSessionResponse, SessionApi, StreamKind,
    TeardownList, TransportError,
};
pub use services::{AttachOutcome, SessionRegistry, SubscriptionClaim};
pub use settings::{EngineSettings, SettingsError, validate_settings};

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
