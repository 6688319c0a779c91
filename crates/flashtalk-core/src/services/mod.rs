//! Stateful services built on the domain types.

pub mod session_registry;

pub use session_registry::{AttachOutcome, SessionRegistry, SubscriptionClaim};
