//! Port definitions (trait abstractions) for external collaborators.
//!
//! Adapters live in other crates: `flashtalk-stream` implements
//! [`SessionApi`] over HTTP, `flashtalk-voice` and `flashtalk-engine`
//! produce [`Disposable`] handles.

pub mod disposable;
pub mod session_api;

pub use disposable::{Disposable, TeardownList};
pub use session_api::{
    CLEAN_CLOSE_CODES, FrameByteStream, InitSessionRequest, InitSessionResponse, SessionApi,
    StreamKind, TransportError,
};
