//! FIFO buffer of audio chunks awaiting hand-off to the media buffer.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// Ordered, append-only queue of raw audio chunks.
#[derive(Debug, Default)]
pub struct AudioFrameQueue {
    chunks: VecDeque<Bytes>,
    total_bytes: usize,
}

impl AudioFrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.total_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Remove every queued chunk and return them concatenated, in order.
    pub fn drain_all(&mut self) -> Option<Bytes> {
        match self.chunks.len() {
            0 => None,
            1 => {
                self.total_bytes = 0;
                self.chunks.pop_front()
            }
            _ => {
                let mut joined = BytesMut::with_capacity(self.total_bytes);
                for chunk in self.chunks.drain(..) {
                    joined.extend_from_slice(&chunk);
                }
                self.total_bytes = 0;
                Some(joined.freeze())
            }
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes currently queued.
    pub const fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
