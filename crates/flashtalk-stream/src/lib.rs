#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

mod client;
mod error;
pub mod frame;
mod http;
pub mod sse;

pub use client::{Subscription, TextStreamClient};
pub use error::{FrameError, StreamError};
pub use frame::parse_frame;
pub use http::HttpSessionApi;
pub use sse::{SseDecoder, SseEvent};

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
