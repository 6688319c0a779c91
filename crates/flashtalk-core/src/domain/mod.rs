//! Domain types for the dialogue streaming engine.
//!
//! These types are independent of any transport: no HTTP, socket, or media
//! concerns leak in here.

pub mod frame;
pub mod message;
pub mod session;

pub use frame::{FrameOutcome, TextFrame};
pub use message::{Conversation, Message, MessageId, MessageRole};
pub use session::{ContextMode, Session, SessionContext, SessionId, SessionStatus};
